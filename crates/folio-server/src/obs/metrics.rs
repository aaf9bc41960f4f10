//! In-process metrics registry with Prometheus text exposition.
//!
//! Families are declared up front as [`MetricDefinition`]s and registered once
//! at startup; the returned handles are cheap to clone and are handed to the
//! code that records observations. Series (one per concrete label set) are
//! created lazily on first observation through `DashMap::entry`, which
//! serializes concurrent first observations of the same label set.
//!
//! Label sets must name exactly the declared labels, in any order. Anything
//! else is a programming error and is reported as [`MetricsError`] instead of
//! being dropped.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use super::process::ProcessSnapshot;

/// Content type of [`MetricsRegistry::render`].
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("metric {metric}: label `{label}` is not declared")]
    UnknownLabel { metric: &'static str, label: String },
    #[error("metric {metric}: label `{label}` is missing")]
    MissingLabel { metric: &'static str, label: &'static str },
    #[error("metric {metric}: label `{label}` supplied more than once")]
    DuplicateLabel { metric: &'static str, label: String },
    #[error("metric {metric}: {reason}")]
    InvalidDefinition { metric: &'static str, reason: &'static str },
    #[error("metric {0} is already registered")]
    AlreadyRegistered(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Static description of a metric family.
#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    /// Label names, in exposition order.
    pub labels: &'static [&'static str],
    /// Histogram upper bounds (inclusive), strictly increasing. Empty otherwise.
    pub buckets: &'static [f64],
}

impl MetricDefinition {
    pub const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self { name, help, kind: MetricKind::Counter, labels, buckets: &[] }
    }

    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self { name, help, kind: MetricKind::Gauge, labels, buckets: &[] }
    }

    pub const fn histogram(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
        buckets: &'static [f64],
    ) -> Self {
        Self { name, help, kind: MetricKind::Histogram, labels, buckets }
    }

    fn validate(&self, expected: MetricKind) -> Result<(), MetricsError> {
        let invalid = |reason| MetricsError::InvalidDefinition { metric: self.name, reason };

        if self.kind != expected {
            return Err(invalid("registered as the wrong kind"));
        }
        if !is_metric_name(self.name) {
            return Err(invalid("name must match [a-zA-Z_:][a-zA-Z0-9_:]*"));
        }
        for (i, label) in self.labels.iter().enumerate() {
            if !is_label_name(label) {
                return Err(invalid("label names must match [a-zA-Z_][a-zA-Z0-9_]* and not start with __"));
            }
            if self.labels[..i].contains(label) {
                return Err(invalid("label names must be unique"));
            }
            if self.kind == MetricKind::Histogram && *label == "le" {
                return Err(invalid("histograms cannot use the `le` label"));
            }
        }
        match self.kind {
            MetricKind::Histogram => {
                if self.buckets.is_empty() {
                    return Err(invalid("histograms need at least one bucket"));
                }
                if self.buckets.iter().any(|b| !b.is_finite()) {
                    return Err(invalid("bucket bounds must be finite"));
                }
                if self.buckets.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(invalid("bucket bounds must be strictly increasing"));
                }
            }
            MetricKind::Counter | MetricKind::Gauge => {
                if !self.buckets.is_empty() {
                    return Err(invalid("only histograms take buckets"));
                }
            }
        }
        Ok(())
    }
}

fn is_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !s.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Label values in declaration order.
type LabelKey = Box<[String]>;

fn resolve(def: &MetricDefinition, labels: &[(&str, &str)]) -> Result<LabelKey, MetricsError> {
    for (i, (name, _)) in labels.iter().enumerate() {
        if !def.labels.iter().any(|d| *d == *name) {
            return Err(MetricsError::UnknownLabel { metric: def.name, label: name.to_string() });
        }
        if labels[..i].iter().any(|(n, _)| n == name) {
            return Err(MetricsError::DuplicateLabel { metric: def.name, label: name.to_string() });
        }
    }

    def.labels
        .iter()
        .map(|declared| {
            labels
                .iter()
                .find(|(n, _)| n == declared)
                .map(|(_, v)| v.to_string())
                .ok_or(MetricsError::MissingLabel { metric: def.name, label: *declared })
        })
        .collect()
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        v.to_string()
    }
}

fn label_pairs(names: &[&str], values: &[String]) -> String {
    names
        .iter()
        .zip(values.iter())
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn braced(pairs: &str) -> String {
    if pairs.is_empty() { String::new() } else { format!("{{{pairs}}}") }
}

struct Family<C> {
    def: MetricDefinition,
    cells: DashMap<LabelKey, C>,
}

impl<C> Family<C> {
    fn new(def: MetricDefinition, init: impl FnOnce() -> C) -> Self {
        let cells = DashMap::new();
        // Unlabeled families expose their single series from the start.
        if def.labels.is_empty() {
            cells.insert(LabelKey::default(), init());
        }
        Self { def, cells }
    }

    fn with_cell<R>(
        &self,
        labels: &[(&str, &str)],
        init: impl FnOnce() -> C,
        f: impl FnOnce(&C) -> R,
    ) -> Result<R, MetricsError> {
        let key = resolve(&self.def, labels)?;
        if let Some(cell) = self.cells.get(&key) {
            return Ok(f(cell.value()));
        }
        let cell = self.cells.entry(key).or_insert_with(init);
        Ok(f(cell.value()))
    }

    fn peek<R>(&self, labels: &[(&str, &str)], f: impl FnOnce(&C) -> R) -> Result<Option<R>, MetricsError> {
        let key = resolve(&self.def, labels)?;
        Ok(self.cells.get(&key).map(|cell| f(cell.value())))
    }

    /// Snapshot of every series, sorted by label values.
    fn rows<S>(&self, snap: impl Fn(&C) -> S) -> Vec<(LabelKey, S)> {
        let mut rows: Vec<_> = self
            .cells
            .iter()
            .map(|r| (r.key().clone(), snap(r.value())))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    fn header(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.def.name, self.def.help.replace('\n', " "));
        let _ = writeln!(out, "# TYPE {} {}", self.def.name, self.def.kind.as_str());
    }
}

/// Monotonic counter handle.
#[derive(Clone)]
pub struct Counter(Arc<Family<AtomicU64>>);

impl Counter {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.add(labels, 1)
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], delta: u64) -> Result<(), MetricsError> {
        self.0.with_cell(labels, || AtomicU64::new(0), |c| {
            c.fetch_add(delta, Ordering::Relaxed);
        })
    }

    /// Current value; 0 for a label set never observed.
    pub fn get(&self, labels: &[(&str, &str)]) -> Result<u64, MetricsError> {
        Ok(self.0.peek(labels, |c| c.load(Ordering::Relaxed))?.unwrap_or(0))
    }

    pub fn name(&self) -> &'static str {
        self.0.def.name
    }

    fn render(&self, out: &mut String) {
        let family = &self.0;
        family.header(out);
        for (key, val) in family.rows(|c| c.load(Ordering::Relaxed)) {
            let pairs = label_pairs(family.def.labels, &key);
            let _ = writeln!(out, "{}{} {}", family.def.name, braced(&pairs), val);
        }
    }
}

/// Gauge handle (signed, settable).
#[derive(Clone)]
pub struct Gauge(Arc<Family<AtomicI64>>);

impl Gauge {
    pub fn set(&self, labels: &[(&str, &str)], v: i64) -> Result<(), MetricsError> {
        self.0.with_cell(labels, || AtomicI64::new(0), |g| g.store(v, Ordering::Relaxed))
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, labels: &[(&str, &str)], delta: i64) -> Result<(), MetricsError> {
        self.0.with_cell(labels, || AtomicI64::new(0), |g| {
            g.fetch_add(delta, Ordering::Relaxed);
        })
    }

    pub fn inc(&self, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.add(labels, 1)
    }

    pub fn dec(&self, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.add(labels, -1)
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> Result<i64, MetricsError> {
        Ok(self.0.peek(labels, |g| g.load(Ordering::Relaxed))?.unwrap_or(0))
    }

    fn render(&self, out: &mut String) {
        let family = &self.0;
        family.header(out);
        for (key, val) in family.rows(|g| g.load(Ordering::Relaxed)) {
            let pairs = label_pairs(family.def.labels, &key);
            let _ = writeln!(out, "{}{} {}", family.def.name, braced(&pairs), val);
        }
    }
}

struct HistogramCell {
    /// Cumulative: slot `i` counts observations `<= bounds[i]`.
    buckets: Box<[AtomicU64]>,
    count: AtomicU64,
    /// f64 bits.
    sum: AtomicU64,
}

impl HistogramCell {
    fn new(n: usize) -> Self {
        Self {
            buckets: (0..n).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0f64.to_bits()),
        }
    }

    // `count` is bumped before the buckets and read after them, so a
    // concurrent scrape never shows a bucket above `+Inf`.
    fn observe(&self, bounds: &[f64], v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bound, slot) in bounds.iter().zip(self.buckets.iter()) {
            if v <= *bound {
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
        let mut cur = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + v).to_bits();
            match self.sum.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    fn snapshot(&self, bounds: &[f64]) -> HistogramSnapshot {
        let buckets = bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(b, slot)| (*b, slot.load(Ordering::Relaxed)))
            .collect();
        HistogramSnapshot {
            buckets,
            count: self.count.load(Ordering::Relaxed),
            sum: f64::from_bits(self.sum.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time view of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper bound, cumulative count)`.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

impl HistogramSnapshot {
    pub fn bucket(&self, le: f64) -> Option<u64> {
        self.buckets.iter().find(|(b, _)| *b == le).map(|(_, c)| *c)
    }
}

/// Histogram handle (seconds).
#[derive(Clone)]
pub struct Histogram(Arc<Family<HistogramCell>>);

impl Histogram {
    pub fn observe(&self, labels: &[(&str, &str)], v: f64) -> Result<(), MetricsError> {
        let def = &self.0.def;
        self.0.with_cell(
            labels,
            || HistogramCell::new(def.buckets.len()),
            |h| h.observe(def.buckets, v),
        )
    }

    pub fn observe_duration(&self, labels: &[(&str, &str)], d: Duration) -> Result<(), MetricsError> {
        self.observe(labels, d.as_secs_f64())
    }

    /// `None` for a label set never observed.
    pub fn snapshot(&self, labels: &[(&str, &str)]) -> Result<Option<HistogramSnapshot>, MetricsError> {
        let def = &self.0.def;
        self.0.peek(labels, |h| h.snapshot(def.buckets))
    }

    pub fn buckets(&self) -> &'static [f64] {
        self.0.def.buckets
    }

    fn render(&self, out: &mut String) {
        let family = &self.0;
        let def = &family.def;
        family.header(out);
        for (key, snap) in family.rows(|h| h.snapshot(def.buckets)) {
            let pairs = label_pairs(def.labels, &key);
            let prefix = if pairs.is_empty() { String::new() } else { format!("{pairs},") };

            for (le, count) in &snap.buckets {
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", def.name, prefix, fmt_float(*le), count);
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", def.name, prefix, snap.count);
            let _ = writeln!(out, "{}_sum{} {}", def.name, braced(&pairs), fmt_float(snap.sum));
            let _ = writeln!(out, "{}_count{} {}", def.name, braced(&pairs), snap.count);
        }
    }
}

enum Registered {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

impl Registered {
    fn name(&self) -> &'static str {
        match self {
            Registered::Counter(c) => c.0.def.name,
            Registered::Gauge(g) => g.0.def.name,
            Registered::Histogram(h) => h.0.def.name,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Registered::Counter(c) => c.render(out),
            Registered::Gauge(g) => g.render(out),
            Registered::Histogram(h) => h.render(out),
        }
    }
}

/// Process-wide set of metric families, in registration order.
#[derive(Default)]
pub struct MetricsRegistry {
    families: RwLock<Vec<Registered>>,
    process: bool,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that also exposes the standard `process_*` families.
    pub fn with_process_metrics() -> Self {
        Self { process: true, ..Self::default() }
    }

    pub fn register_counter(&self, def: MetricDefinition) -> Result<Counter, MetricsError> {
        def.validate(MetricKind::Counter)?;
        let counter = Counter(Arc::new(Family::new(def, || AtomicU64::new(0))));
        self.insert(Registered::Counter(counter.clone()))?;
        Ok(counter)
    }

    pub fn register_gauge(&self, def: MetricDefinition) -> Result<Gauge, MetricsError> {
        def.validate(MetricKind::Gauge)?;
        let gauge = Gauge(Arc::new(Family::new(def, || AtomicI64::new(0))));
        self.insert(Registered::Gauge(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn register_histogram(&self, def: MetricDefinition) -> Result<Histogram, MetricsError> {
        def.validate(MetricKind::Histogram)?;
        let n = def.buckets.len();
        let histogram = Histogram(Arc::new(Family::new(def, || HistogramCell::new(n))));
        self.insert(Registered::Histogram(histogram.clone()))?;
        Ok(histogram)
    }

    fn insert(&self, family: Registered) -> Result<(), MetricsError> {
        let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
        if families.iter().any(|f| f.name() == family.name()) {
            return Err(MetricsError::AlreadyRegistered(family.name()));
        }
        families.push(family);
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let families = self.families.read().unwrap_or_else(PoisonError::into_inner);
        families.iter().map(Registered::name).collect()
    }

    /// Render every family in Prometheus text exposition format. Read-only.
    pub fn render(&self) -> String {
        let families = self.families.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for family in families.iter() {
            family.render(&mut out);
        }
        if self.process {
            ProcessSnapshot::read().render(&mut out);
        }
        out
    }
}
