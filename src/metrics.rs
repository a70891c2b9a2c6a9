//! Process-wide counters, reported by `GET /health`.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static CONNECTIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
static INBOUND_MESSAGES: AtomicU64 = AtomicU64::new(0);
static OUTBOUND_MESSAGES: AtomicU64 = AtomicU64::new(0);
static CLIENT_ERRORS: AtomicU64 = AtomicU64::new(0);
static RATE_LIMITED: AtomicU64 = AtomicU64::new(0);
static JOIN_REJECTIONS: AtomicU64 = AtomicU64::new(0);
static MIRROR_WRITES: AtomicU64 = AtomicU64::new(0);
static MIRROR_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_connections_opened() {
    CONNECTIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_connections_closed() {
    CONNECTIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_inbound() {
    INBOUND_MESSAGES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_outbound() {
    OUTBOUND_MESSAGES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_client_errors() {
    CLIENT_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_rate_limited() {
    RATE_LIMITED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_join_rejections() {
    JOIN_REJECTIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_mirror_writes() {
    MIRROR_WRITES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_mirror_failures() {
    MIRROR_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub connections_open: u64,
    pub connections_total: u64,
    pub inbound_messages: u64,
    pub outbound_messages: u64,
    pub client_errors: u64,
    pub rate_limited: u64,
    pub join_rejections: u64,
    pub mirror_writes: u64,
    pub mirror_failures: u64,
}

pub fn snapshot() -> Snapshot {
    let opened = CONNECTIONS_OPENED.load(Ordering::Relaxed);
    let closed = CONNECTIONS_CLOSED.load(Ordering::Relaxed);
    Snapshot {
        connections_open: opened.saturating_sub(closed),
        connections_total: opened,
        inbound_messages: INBOUND_MESSAGES.load(Ordering::Relaxed),
        outbound_messages: OUTBOUND_MESSAGES.load(Ordering::Relaxed),
        client_errors: CLIENT_ERRORS.load(Ordering::Relaxed),
        rate_limited: RATE_LIMITED.load(Ordering::Relaxed),
        join_rejections: JOIN_REJECTIONS.load(Ordering::Relaxed),
        mirror_writes: MIRROR_WRITES.load(Ordering::Relaxed),
        mirror_failures: MIRROR_FAILURES.load(Ordering::Relaxed),
    }
}
