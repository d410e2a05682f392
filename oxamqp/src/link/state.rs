//! Link state and link flow state

use oxamqp_types::{
    definitions::{serial, Fields, Handle, SequenceNo},
    performatives::Flow,
};

/// Link state.
///
/// There is no official definition of the link state in the specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The initial state after initialization
    Unattached,

    /// An attach frame has been sent
    AttachSent,

    /// An attach frame has been received
    AttachReceived,

    /// The link is attached
    Attached,

    /// A detach frame has been sent
    DetachSent,

    /// A detach frame has been received
    DetachReceived,

    /// The link is detached
    Detached,
}

impl LinkState {
    /// Whether deliveries can flow on the link
    pub fn is_attached(&self) -> bool {
        matches!(self, LinkState::Attached)
    }
}

/// The link fields of a flow frame
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFlow {
    /// Handle of the link the flow state applies to
    pub handle: Handle,

    /// The sender's delivery count
    pub delivery_count: Option<SequenceNo>,

    /// The current maximum number of messages that can be received
    pub link_credit: Option<u32>,

    /// The number of available messages
    pub available: Option<u32>,

    /// Indicates drain mode
    pub drain: bool,

    /// Request state from partner
    pub echo: bool,

    /// Link state properties
    pub properties: Option<Fields>,
}

impl TryFrom<Flow> for LinkFlow {
    type Error = Flow;

    fn try_from(value: Flow) -> Result<Self, Self::Error> {
        let handle = match value.handle {
            Some(handle) => handle,
            None => return Err(value),
        };
        Ok(LinkFlow {
            handle,
            delivery_count: value.delivery_count,
            link_credit: value.link_credit,
            available: value.available,
            drain: value.drain,
            echo: value.echo,
            properties: value.properties,
        })
    }
}

/// Not enough link credit for the delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InsufficientCredit;

/// Flow control state of one link endpoint
///
/// The sender and the receiver keep the same fields but update them differently, see
/// [`LinkFlowState::on_sender_flow`] and [`LinkFlowState::on_receiver_flow`].
#[derive(Debug, Clone)]
pub(crate) struct LinkFlowState {
    pub initial_delivery_count: SequenceNo,
    pub delivery_count: SequenceNo,
    pub link_credit: u32,
    pub available: u32,
    pub drain: bool,
}

impl LinkFlowState {
    pub fn sender(initial_delivery_count: SequenceNo) -> Self {
        Self {
            initial_delivery_count,
            delivery_count: initial_delivery_count,
            link_credit: 0,
            available: 0,
            drain: false,
        }
    }

    pub fn receiver(link_credit: u32) -> Self {
        Self {
            initial_delivery_count: 0,
            delivery_count: 0,
            link_credit,
            available: 0,
            drain: false,
        }
    }

    pub fn as_link_flow(&self, handle: Handle, echo: bool) -> LinkFlow {
        LinkFlow {
            handle,
            delivery_count: Some(self.delivery_count),
            link_credit: Some(self.link_credit),
            available: Some(self.available),
            drain: self.drain,
            echo,
            properties: None,
        }
    }

    /// Handles the flow state sent by the receiving end of a sender link
    ///
    /// Returns `true` if the local flow state must be sent back, either because the receiver
    /// requested an echo or because the credit was drained.
    pub fn on_sender_flow(&mut self, flow: &LinkFlow) -> bool {
        // In the event that the receiver does not yet know the delivery-count, the sender MUST
        // assume it is the initial delivery-count it sent in the attach
        let delivery_count_rcv = flow.delivery_count.unwrap_or(self.initial_delivery_count);

        // link-credit_snd := delivery-count_rcv + link-credit_rcv - delivery-count_snd
        //
        // Evaluated mod 2^32. Deliveries the receiver has not accounted for yet are taken out
        // of its credit, with a floor of zero.
        if let Some(link_credit_rcv) = flow.link_credit {
            let in_flight = self.delivery_count.wrapping_sub(delivery_count_rcv);
            self.link_credit = if serial::precedes_or_eq(delivery_count_rcv, self.delivery_count)
            {
                link_credit_rcv.saturating_sub(in_flight)
            } else {
                0
            };
        }

        self.drain = flow.drain;
        if flow.drain && self.link_credit > 0 {
            self.delivery_count = self.delivery_count.wrapping_add(self.link_credit);
            self.link_credit = 0;
            return true;
        }

        flow.echo || flow.drain
    }

    /// Handles the flow state sent by the sending end of a receiver link
    ///
    /// Returns `true` if an echo was requested.
    pub fn on_receiver_flow(&mut self, flow: &LinkFlow) -> bool {
        if let Some(delivery_count_snd) = flow.delivery_count {
            // A draining sender advances its delivery-count past unused credit
            if serial::precedes(self.delivery_count, delivery_count_snd) {
                let advanced = delivery_count_snd.wrapping_sub(self.delivery_count);
                self.link_credit = self.link_credit.saturating_sub(advanced);
            }
            self.delivery_count = delivery_count_snd;
        }

        if let Some(available) = flow.available {
            self.available = available;
        }

        flow.echo
    }

    /// Consumes one credit for an outgoing delivery
    pub fn consume_sender(&mut self) -> Result<(), InsufficientCredit> {
        if self.link_credit == 0 {
            return Err(InsufficientCredit);
        }
        self.delivery_count = self.delivery_count.wrapping_add(1);
        self.link_credit -= 1;
        Ok(())
    }

    /// Consumes one credit for an incoming delivery
    pub fn consume_receiver(&mut self) -> Result<(), InsufficientCredit> {
        if self.link_credit == 0 {
            return Err(InsufficientCredit);
        }
        self.delivery_count = self.delivery_count.wrapping_add(1);
        self.link_credit -= 1;
        self.available = self.available.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_types::{definitions::Handle, performatives::Flow};

    use super::{InsufficientCredit, LinkFlow, LinkFlowState};

    fn credit(delivery_count: u32, link_credit: u32) -> LinkFlow {
        LinkFlow {
            handle: Handle(0),
            delivery_count: Some(delivery_count),
            link_credit: Some(link_credit),
            available: None,
            drain: false,
            echo: false,
            properties: None,
        }
    }

    #[test]
    fn session_flow_is_not_a_link_flow() {
        let flow = Flow {
            incoming_window: 10,
            outgoing_window: 10,
            ..Default::default()
        };
        assert!(LinkFlow::try_from(flow).is_err());
    }

    #[test]
    fn first_flow_grants_credit() {
        let mut state = LinkFlowState::sender(0);
        let mut flow = credit(0, 5);
        flow.delivery_count = None;
        assert!(!state.on_sender_flow(&flow));
        assert_eq!(state.link_credit, 5);

        for _ in 0..5 {
            state.consume_sender().unwrap();
        }
        assert_eq!(state.consume_sender(), Err(InsufficientCredit));
        assert_eq!(state.delivery_count, 5);
    }

    #[test]
    fn in_flight_deliveries_reduce_granted_credit() {
        let mut state = LinkFlowState::sender(0);
        state.on_sender_flow(&credit(0, 10));
        for _ in 0..4 {
            state.consume_sender().unwrap();
        }
        // The receiver had only seen two of the four deliveries when it topped credit up to 10
        state.on_sender_flow(&credit(2, 10));
        assert_eq!(state.link_credit, 8);
    }

    #[test]
    fn credit_is_computed_across_wraparound() {
        let mut state = LinkFlowState::sender(u32::MAX - 1);
        state.on_sender_flow(&credit(u32::MAX - 1, 4));
        for _ in 0..3 {
            state.consume_sender().unwrap();
        }
        assert_eq!(state.delivery_count, 1);
        state.on_sender_flow(&credit(0, 4));
        assert_eq!(state.link_credit, 3);
    }

    #[test]
    fn receiver_ahead_of_sender_grants_nothing() {
        let mut state = LinkFlowState::sender(0);
        state.on_sender_flow(&credit(3, 10));
        assert_eq!(state.link_credit, 0);
    }

    #[test]
    fn drain_consumes_remaining_credit() {
        let mut state = LinkFlowState::sender(7);
        let mut flow = credit(7, 3);
        flow.drain = true;
        assert!(state.on_sender_flow(&flow));
        assert_eq!(state.link_credit, 0);
        assert_eq!(state.delivery_count, 10);
    }

    #[test]
    fn echo_requests_reply_without_changing_credit() {
        let mut state = LinkFlowState::sender(0);
        state.on_sender_flow(&credit(0, 2));
        let mut flow = credit(0, 2);
        flow.echo = true;
        assert!(state.on_sender_flow(&flow));
        assert_eq!(state.link_credit, 2);
    }

    #[test]
    fn receiver_accounts_for_drained_credit() {
        let mut state = LinkFlowState::receiver(5);
        state.delivery_count = 100;
        state.consume_receiver().unwrap();
        let sender_flow = LinkFlow {
            delivery_count: Some(105),
            link_credit: Some(0),
            ..credit(0, 0)
        };
        assert!(!state.on_receiver_flow(&sender_flow));
        assert_eq!(state.delivery_count, 105);
        assert_eq!(state.link_credit, 0);
    }

    /// Replays interleavings of credit grants, deliveries and acknowledgements and checks that
    /// the sender never has more unacknowledged deliveries outstanding than the receiver granted
    #[test]
    fn outstanding_deliveries_never_exceed_granted_credit() {
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for initial in [0u32, u32::MAX - 20, 1 << 31] {
            let mut sender = LinkFlowState::sender(initial);
            // receiver view
            let mut rcv_count = initial;
            // deliveries sent but not yet seen by the receiver
            let mut in_flight = 0u32;
            // deliveries the latest grant allows beyond what was already in flight
            let mut allowed = 0u32;
            let mut sent_since_grant = 0u32;

            for _ in 0..2_000 {
                match next() % 3 {
                    0 => {
                        let rcv_credit = next() % 16;
                        sender.on_sender_flow(&credit(rcv_count, rcv_credit));
                        allowed = rcv_credit.saturating_sub(in_flight);
                        sent_since_grant = 0;
                    }
                    1 => {
                        if sender.consume_sender().is_ok() {
                            in_flight += 1;
                            sent_since_grant += 1;
                        }
                    }
                    _ => {
                        if in_flight > 0 {
                            in_flight -= 1;
                            rcv_count = rcv_count.wrapping_add(1);
                        }
                    }
                }
                assert_eq!(sender.delivery_count.wrapping_sub(rcv_count), in_flight);
                assert!(sent_since_grant <= allowed);
                assert_eq!(sender.link_credit, allowed - sent_since_grant);
            }
        }
    }
}
