//! Paper desk orchestrator
//!
//! One matching engine per registered instrument, one shared portfolio,
//! the funding simulator and the state store, driven by a single
//! tick-driven caller loop. Single-threaded and cooperative: no locking
//! anywhere inside the engines or the portfolio.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

use crate::engine::{EngineConfig, OrderMatchingEngine, OrderRequest};
use crate::error::DeskError;
use crate::events::{DeskEvent, EventLog, Sequencer};
use crate::feed::MarketDataFeed;
use crate::fees::FeeModel;
use crate::fill::{derive_seed, FillModel, QueueFillConfig, QueueFillModel};
use crate::funding::FundingSimulator;
use crate::latency::LatencyModel;
use crate::portfolio::PaperPortfolio;
use crate::state::{DeskStateSnapshot, StateStore};
use crate::types::{InstrumentId, InstrumentSpec, OrderId};

/// Everything needed to trade one instrument on the desk.
pub struct InstrumentRegistration {
    pub spec: InstrumentSpec,
    pub feed: Box<dyn MarketDataFeed>,
    pub fill_model: Box<dyn FillModel>,
    pub fee_model: Box<dyn FeeModel>,
    pub latency: LatencyModel,
    pub engine_config: EngineConfig,
}

pub struct PaperDesk {
    engines: BTreeMap<InstrumentId, OrderMatchingEngine>,
    feeds: BTreeMap<InstrumentId, Box<dyn MarketDataFeed>>,
    specs: BTreeMap<InstrumentId, InstrumentSpec>,
    portfolio: PaperPortfolio,
    funding: FundingSimulator,
    state_store: Option<StateStore>,
    sequencer: Sequencer,
    next_order_id: u64,
    master_seed: u64,
    event_log: EventLog,
}

impl PaperDesk {
    pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

    pub fn new(portfolio: PaperPortfolio, master_seed: u64, event_log_capacity: usize) -> Self {
        Self {
            engines: BTreeMap::new(),
            feeds: BTreeMap::new(),
            specs: BTreeMap::new(),
            portfolio,
            funding: FundingSimulator::new(),
            state_store: None,
            sequencer: Sequencer::new(),
            next_order_id: 1,
            master_seed,
            event_log: EventLog::new(event_log_capacity),
        }
    }

    /// Attach a throttled state store and restore any previous snapshot.
    pub fn with_state_store(mut self, store: StateStore) -> Result<Self, DeskError> {
        if let Some(snapshot) = store
            .load()
            .map_err(|e| DeskError::Config(format!("state restore: {e}")))?
        {
            snapshot.apply(&mut self.portfolio);
        }
        self.state_store = Some(store);
        Ok(self)
    }

    /// Register one instrument with explicitly constructed models.
    pub fn register(&mut self, registration: InstrumentRegistration) -> Result<(), DeskError> {
        let id = registration.spec.id.clone();
        if self.engines.contains_key(&id) {
            return Err(DeskError::DuplicateInstrument(id.to_string()));
        }
        let engine = OrderMatchingEngine::new(
            registration.spec.clone(),
            registration.engine_config,
            registration.latency,
            registration.fill_model,
            registration.fee_model,
        );
        self.specs.insert(id.clone(), registration.spec);
        self.feeds.insert(id.clone(), registration.feed);
        self.engines.insert(id.clone(), engine);
        info!(instrument = %id, "[DESK] Instrument registered");
        Ok(())
    }

    /// Register with the default queue-position fill model, seeded
    /// deterministically from the desk master seed and the instrument id.
    pub fn register_queue_model(
        &mut self,
        spec: InstrumentSpec,
        feed: Box<dyn MarketDataFeed>,
        fill_config: QueueFillConfig,
        fee_model: Box<dyn FeeModel>,
        latency: LatencyModel,
        engine_config: EngineConfig,
    ) -> Result<(), DeskError> {
        let seed = derive_seed(self.master_seed, &spec.id);
        let fill_model = Box::new(QueueFillModel::new(fill_config, &spec, seed));
        self.register(InstrumentRegistration {
            spec,
            feed,
            fill_model,
            fee_model,
            latency,
            engine_config,
        })
    }

    pub fn portfolio(&self) -> &PaperPortfolio {
        &self.portfolio
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.engines.keys()
    }

    pub fn open_orders(&self, instrument: &InstrumentId) -> Option<Vec<&crate::types::PaperOrder>> {
        self.engines
            .get(instrument)
            .map(|e| e.open_orders().collect())
    }

    pub fn get_order(&self, instrument: &InstrumentId, id: OrderId) -> Option<&crate::types::PaperOrder> {
        self.engines.get(instrument)?.get_order(id)
    }

    /// Bounded in-memory event history.
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Route an order to its instrument's engine. Returns the assigned
    /// id plus the emitted events (one accept or reject).
    pub fn submit_order(
        &mut self,
        instrument: &InstrumentId,
        request: OrderRequest,
        now: i64,
    ) -> Result<(OrderId, Vec<DeskEvent>), DeskError> {
        let engine = self
            .engines
            .get_mut(instrument)
            .ok_or_else(|| DeskError::UnknownInstrument(instrument.to_string()))?;
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let event = engine.submit_order(id, request, &mut self.portfolio, &mut self.sequencer, now);
        let events = vec![event];
        self.log_events(&events);
        Ok((id, events))
    }

    pub fn cancel_order(
        &mut self,
        instrument: &InstrumentId,
        order_id: OrderId,
        now: i64,
    ) -> Result<Vec<DeskEvent>, DeskError> {
        let engine = self
            .engines
            .get_mut(instrument)
            .ok_or_else(|| DeskError::UnknownInstrument(instrument.to_string()))?;
        let events = engine.cancel_order(order_id, &mut self.portfolio, &mut self.sequencer, now);
        self.log_events(&events);
        Ok(events)
    }

    /// Cancel every active order on every instrument.
    pub fn cancel_all(&mut self, now: i64) -> Vec<DeskEvent> {
        let mut events = Vec::new();
        for engine in self.engines.values_mut() {
            events.extend(engine.cancel_all(&mut self.portfolio, &mut self.sequencer, now));
        }
        self.log_events(&events);
        events
    }

    /// One clock advance for the whole desk: books, matching, funding,
    /// mark-to-market, throttled persistence.
    ///
    /// A panic inside one instrument's tick is contained as a single
    /// `EngineError` for that instrument; every other instrument's tick
    /// proceeds untouched.
    pub fn tick(&mut self, now: i64) -> Vec<DeskEvent> {
        let mut events = Vec::new();
        let ids: Vec<InstrumentId> = self.engines.keys().cloned().collect();

        for id in &ids {
            let engine = match self.engines.get_mut(id) {
                Some(e) => e,
                None => continue,
            };
            if let Some(book) = self.feeds.get(id).and_then(|f| f.get_book(id)) {
                engine.update_book(book);
            }
            let portfolio = &mut self.portfolio;
            let sequencer = &mut self.sequencer;
            match panic::catch_unwind(AssertUnwindSafe(|| {
                engine.tick(portfolio, sequencer, now)
            })) {
                Ok(engine_events) => events.extend(engine_events),
                Err(payload) => {
                    let detail = panic_detail(payload);
                    error!(instrument = %id, detail = %detail, "[DESK] Engine tick panicked");
                    events.push(DeskEvent::EngineError {
                        seq: self.sequencer.next(),
                        timestamp: now,
                        instrument: id.clone(),
                        detail,
                    });
                }
            }
        }

        // Funding pass, independent of per-instrument matching.
        for id in &ids {
            let (spec, feed) = match (self.specs.get(id), self.feeds.get(id)) {
                (Some(s), Some(f)) => (s, f),
                _ => continue,
            };
            let rate = feed.get_funding_rate(id);
            let mark = feed
                .get_mid_price(id)
                .or_else(|| self.engines.get(id).and_then(|e| e.book()).and_then(|b| b.mid_price()))
                .unwrap_or(Decimal::ZERO);
            if let Some(outcome) =
                self.funding
                    .tick_instrument(spec, rate, mark, &mut self.portfolio, now)
            {
                events.push(DeskEvent::FundingApplied {
                    seq: self.sequencer.next(),
                    timestamp: now,
                    instrument: id.clone(),
                    funding_rate: outcome.funding_rate,
                    charge: outcome.charge,
                    position_quantity: outcome.position_quantity,
                });
            }
        }

        // Mark to market with the freshest mids we have.
        let mut marks = BTreeMap::new();
        for id in &ids {
            let mid = self
                .feeds
                .get(id)
                .and_then(|f| f.get_mid_price(id))
                .or_else(|| self.engines.get(id).and_then(|e| e.book()).and_then(|b| b.mid_price()));
            if let Some(mid) = mid {
                marks.insert(id.clone(), mid);
            }
        }
        self.portfolio.mark_to_market(&marks, &self.specs);

        self.persist(now, false);
        self.log_events(&events);
        events
    }

    /// Force-flush state and report it. Call on shutdown.
    pub fn shutdown(&mut self, now: i64) {
        self.persist(now, true);
        info!(
            equity = %self.portfolio.last_equity(),
            "[DESK] Shutdown complete"
        );
    }

    fn persist(&mut self, now: i64, force: bool) {
        if let Some(store) = self.state_store.as_mut() {
            let snapshot = DeskStateSnapshot::capture(&self.portfolio, now);
            if let Err(e) = store.save(&snapshot, now, force) {
                error!(error = %e, "[DESK] State save failed");
            }
        }
    }

    fn log_events(&mut self, events: &[DeskEvent]) {
        for event in events {
            self.event_log.push(event.clone());
        }
    }
}

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
