//! Host bridge boundary
//!
//! The single module where the core meets a host trading runtime. A
//! host registers a notifier at setup time; the adapter forwards order
//! intents into the desk and replays desk events back as host-native
//! notifications. Every other module builds and tests with zero
//! host-runtime dependency, and retries/reconnection policy belongs on
//! the host side of this seam, never inside the deterministic core.

use crate::desk::PaperDesk;
use crate::engine::OrderRequest;
use crate::error::DeskError;
use crate::events::DeskEvent;
use crate::types::{InstrumentId, OrderId};

/// Host-facing notification sink. Implemented by the host integration,
/// one method per notification the host understands.
pub trait HostNotifier: Send {
    fn on_accepted(&mut self, instrument: &InstrumentId, order_id: OrderId);
    fn on_fill(
        &mut self,
        instrument: &InstrumentId,
        order_id: OrderId,
        event: &DeskEvent,
    );
    fn on_canceled(&mut self, instrument: &InstrumentId, order_id: OrderId);
    fn on_rejected(&mut self, instrument: &InstrumentId, order_id: Option<OrderId>, reason: &str);
    fn on_engine_error(&mut self, instrument: &InstrumentId, detail: &str);
}

/// Translates host order/cancel calls into desk calls and desk events
/// into notifier callbacks.
pub struct BridgeAdapter<N: HostNotifier> {
    notifier: N,
}

impl<N: HostNotifier> BridgeAdapter<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Submit on behalf of the host and replay the resulting events.
    pub fn submit(
        &mut self,
        desk: &mut PaperDesk,
        instrument: &InstrumentId,
        request: OrderRequest,
        now: i64,
    ) -> Result<OrderId, DeskError> {
        let (order_id, events) = desk.submit_order(instrument, request, now)?;
        self.replay(&events);
        Ok(order_id)
    }

    /// Cancel on behalf of the host and replay the resulting events.
    pub fn cancel(
        &mut self,
        desk: &mut PaperDesk,
        instrument: &InstrumentId,
        order_id: OrderId,
        now: i64,
    ) -> Result<(), DeskError> {
        let events = desk.cancel_order(instrument, order_id, now)?;
        self.replay(&events);
        Ok(())
    }

    /// Advance the desk clock and replay everything that happened.
    pub fn tick(&mut self, desk: &mut PaperDesk, now: i64) {
        let events = desk.tick(now);
        self.replay(&events);
    }

    /// Convert desk events into host notifications, in order.
    pub fn replay(&mut self, events: &[DeskEvent]) {
        for event in events {
            match event {
                DeskEvent::OrderAccepted {
                    instrument,
                    order_id,
                    ..
                } => self.notifier.on_accepted(instrument, *order_id),
                DeskEvent::OrderFilled {
                    instrument,
                    order_id,
                    ..
                } => self.notifier.on_fill(instrument, *order_id, event),
                DeskEvent::OrderCanceled {
                    instrument,
                    order_id,
                    ..
                } => self.notifier.on_canceled(instrument, *order_id),
                DeskEvent::OrderRejected {
                    instrument,
                    order_id,
                    reason,
                    ..
                } => self.notifier.on_rejected(instrument, *order_id, reason),
                DeskEvent::EngineError {
                    instrument, detail, ..
                } => self.notifier.on_engine_error(instrument, detail),
                // Position/funding telemetry stays desk-internal; hosts
                // that want it read the event log directly.
                DeskEvent::PositionChanged { .. } | DeskEvent::FundingApplied { .. } => {}
            }
        }
    }
}
