use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    models::{RoomMetadata, RoomStatus},
    occupancy::OccupancyResolver,
    settings::BuildingConfig,
    store::{ChangeCallback, RealtimeStore, Subscription},
};

use super::state::{FeedEvent, FeedState, FloorView, RoomBoard, RoomView};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Receives every recomputed board.
pub trait BoardSink: Send + Sync + 'static {
    fn publish(&self, board: &RoomBoard);
}

/// Owns the live subscriptions behind the building screen.
///
/// Store callbacks only forward snapshots into a channel; a single task turns
/// them into a [`RoomBoard`], clearing rooms whose scan has closed along the
/// way. Dropping the monitor or calling [`RoomMonitor::shutdown`] releases the
/// subscriptions and stops the task.
pub struct RoomMonitor {
    events: mpsc::UnboundedSender<FeedEvent>,
    board: watch::Receiver<RoomBoard>,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl RoomMonitor {
    pub async fn start<S, K>(store: S, config: BuildingConfig, sink: K) -> Result<Self>
    where
        S: RealtimeStore + Clone,
        K: BoardSink,
    {
        let resolver = OccupancyResolver::new(store.clone(), &config.rooms_path)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (board_tx, board_rx) = watch::channel(RoomBoard::loading(&config));
        let cancel_token = CancellationToken::new();

        let worker = tokio::spawn(feed_loop(
            resolver,
            config.clone(),
            Arc::new(sink),
            events_rx,
            board_tx,
            cancel_token.clone(),
        ));

        let monitor = Self {
            events: events_tx.clone(),
            board: board_rx,
            cancel_token,
            worker: Mutex::new(Some(worker)),
            subscriptions: Mutex::new(Vec::new()),
        };

        let scans = store
            .subscribe(&config.scans_path, forward(&events_tx, FeedEvent::Scans))
            .await
            .with_context(|| format!("failed to subscribe to {}", config.scans_path))?;
        let rooms = store
            .subscribe(&config.rooms_path, forward(&events_tx, FeedEvent::Rooms))
            .await
            .with_context(|| format!("failed to subscribe to {}", config.rooms_path))?;
        monitor.hold(scans);
        monitor.hold(rooms);

        log_info!(
            "Room monitor started for {} building ({} floors)",
            config.name,
            config.floors.len()
        );
        Ok(monitor)
    }

    fn hold(&self, subscription: Subscription) {
        match self.subscriptions.lock() {
            Ok(mut guard) => guard.push(subscription),
            Err(poisoned) => poisoned.into_inner().push(subscription),
        }
    }

    /// Latest board.
    pub fn board(&self) -> RoomBoard {
        self.board.borrow().clone()
    }

    pub fn room(&self, room: &str) -> Option<RoomView> {
        self.board.borrow().room(room).cloned()
    }

    /// Receiver that wakes on every new board.
    pub fn watch(&self) -> watch::Receiver<RoomBoard> {
        self.board.clone()
    }

    /// The room's current view, refusing rooms that cannot be requested.
    pub fn requestable_room(&self, room: &str) -> Result<RoomView> {
        let view = self
            .room(room)
            .ok_or_else(|| anyhow!("unknown room {room}"))?;
        view.status.ensure_requestable()?;
        Ok(view)
    }

    /// Swaps the room → badge binding and re-evaluates every room.
    pub fn rebind(&self, bindings: BTreeMap<String, String>) -> Result<()> {
        self.events
            .send(FeedEvent::Rebind(bindings))
            .map_err(|_| anyhow!("room monitor is not running"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();
        self.release_subscriptions();

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.await.context("room monitor task failed to join")?;
        }
        Ok(())
    }

    fn release_subscriptions(&self) {
        let released = match self.subscriptions.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        drop(released);
    }
}

impl Drop for RoomMonitor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn forward(
    events: &mpsc::UnboundedSender<FeedEvent>,
    wrap: fn(Value) -> FeedEvent,
) -> ChangeCallback {
    let events = events.clone();
    Arc::new(move |snapshot: &Value| {
        // The worker is gone after shutdown; late notifications are dropped.
        let _ = events.send(wrap(snapshot.clone()));
    })
}

async fn feed_loop<S, K>(
    resolver: OccupancyResolver<S>,
    mut config: BuildingConfig,
    sink: Arc<K>,
    mut events: mpsc::UnboundedReceiver<FeedEvent>,
    board_tx: watch::Sender<RoomBoard>,
    cancel_token: CancellationToken,
) where
    S: RealtimeStore,
    K: BoardSink,
{
    let mut feed = FeedState::default();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("room monitor shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    log_error!("room monitor feed closed unexpectedly");
                    break;
                };
                feed.apply(event, &mut config);
                // Coalesce bursts of notifications into one evaluation.
                let mut coalesced = 1;
                while let Ok(event) = events.try_recv() {
                    feed.apply(event, &mut config);
                    coalesced += 1;
                }
                log_debug!("re-evaluating board after {coalesced} feed event(s)");

                let board = evaluate_board(&resolver, &config, &feed).await;
                board_tx.send_replace(board.clone());
                sink.publish(&board);
            }
        }
    }
}

async fn evaluate_board<S: RealtimeStore>(
    resolver: &OccupancyResolver<S>,
    config: &BuildingConfig,
    feed: &FeedState,
) -> RoomBoard {
    let mut floors = Vec::with_capacity(config.floors.len());

    for floor in &config.floors {
        let mut rooms = Vec::with_capacity(floor.rooms.len());
        for room in &floor.rooms {
            let bound_badge = config.badge_for(room);
            let current = feed.metadata_for(room);

            // Resets wait for the rooms snapshot so they can be skipped when
            // the closed cycle was already cleared.
            let (status, cleared) = if feed.rooms_loaded {
                let evaluation = resolver
                    .evaluate(room, bound_badge, &feed.scans, current.as_ref())
                    .await;
                let cleared = match evaluation.reset {
                    Ok(cleared) => cleared,
                    Err(err) => {
                        log_warn!("room {room} keeps stale metadata: {err}");
                        false
                    }
                };
                (evaluation.status, cleared)
            } else {
                (resolver.resolve_status(room, bound_badge, &feed.scans), false)
            };

            let metadata = if cleared {
                RoomMetadata::default()
            } else {
                current.unwrap_or_default()
            };

            rooms.push(RoomView {
                room: room.clone(),
                floor: floor.name.clone(),
                status,
                color: status.color(),
                badge_id: bound_badge.map(str::to_string),
                metadata,
            });
        }
        floors.push(FloorView {
            name: floor.name.clone(),
            rooms,
        });
    }

    let board = RoomBoard {
        building: config.name.clone(),
        loading: !feed.scans_loaded,
        floors,
    };

    let occupied = board
        .floors
        .iter()
        .flat_map(|floor| floor.rooms.iter())
        .filter(|view| view.status == RoomStatus::Occupied)
        .count();
    if occupied > 0 {
        log_info!("{} building: {occupied} room(s) occupied", config.name);
    }

    board
}
