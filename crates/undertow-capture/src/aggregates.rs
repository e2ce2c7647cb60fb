//! Aggregate resolution: every record an event should be attributed to.
//!
//! Starting from the event's target, records are expanded breadth-first
//! through their [`Model::indirect_aggregates`] hook. A visited set absorbs
//! cycles and duplicates, so the traversal ends once every reachable record
//! has been seen once.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::{params, Connection};
use undertow_types::RecordRef;
use uuid::Uuid;

use crate::error::{BoxError, CaptureError};
use crate::model::Model;

/// Loads a record by id and returns its indirect aggregates, or `None` when
/// the record no longer exists.
type Expander =
    Box<dyn Fn(&Connection, &str) -> Result<Option<Vec<RecordRef>>, BoxError> + Send + Sync>;

/// Maps record type ids to the code that expands their aggregates.
#[derive(Default)]
pub struct AggregateRegistry {
    expanders: HashMap<&'static str, Expander>,
}

impl AggregateRegistry {
    /// An empty registry; no reference is expanded beyond itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M` so references of type `M::RECORD_TYPE` are loaded and
    /// expanded through `M::indirect_aggregates`.
    pub fn register<M: Model + 'static>(&mut self) {
        self.expanders
            .insert(M::RECORD_TYPE, Box::new(expand_model::<M>));
    }

    /// Returns `true` if `record_type` has been registered.
    pub fn is_registered(&self, record_type: &str) -> bool {
        self.expanders.contains_key(record_type)
    }

    /// Resolves the aggregate set of `target`.
    ///
    /// `first_hop`, when given, replaces loading the target itself; the
    /// change detector passes the in-memory record's own aggregates so that
    /// a deleted record still propagates to its aggregates. References that
    /// are unregistered or can no longer be loaded are kept but not
    /// expanded.
    ///
    /// The result starts with `target` and lists each record once, in
    /// discovery order.
    pub fn resolve(
        &self,
        conn: &Connection,
        target: &RecordRef,
        first_hop: Option<Vec<RecordRef>>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordRef>, CaptureError> {
        let mut first_hop = first_hop;
        let mut visited: HashSet<RecordRef> = HashSet::new();
        let mut queue = VecDeque::from([target.clone()]);
        let mut result = Vec::new();

        while let Some(record) = queue.pop_front() {
            if visited.contains(&record) {
                continue;
            }
            visited.insert(record.clone());

            if let Some(limit) = limit {
                if visited.len() > limit {
                    return Err(CaptureError::AggregateLimitExceeded { limit });
                }
            }

            let next = match first_hop.take() {
                Some(records) => records,
                None => self.expand(conn, &record)?,
            };
            for aggregate in next {
                if !visited.contains(&aggregate) {
                    queue.push_back(aggregate);
                }
            }

            result.push(record);
        }

        tracing::trace!(
            target = %target,
            aggregates = result.len(),
            "resolved aggregate set"
        );

        Ok(result)
    }

    fn expand(&self, conn: &Connection, record: &RecordRef) -> Result<Vec<RecordRef>, CaptureError> {
        let Some(expander) = self.expanders.get(record.record_type.as_str()) else {
            return Ok(Vec::new());
        };
        match expander(conn, &record.record_id) {
            Ok(Some(aggregates)) => Ok(aggregates),
            Ok(None) => {
                tracing::trace!(record = %record, "aggregate no longer resolvable, not expanding");
                Ok(Vec::new())
            }
            Err(source) => Err(CaptureError::AggregateResolution {
                record: record.clone(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.expanders.keys().collect();
        types.sort();
        f.debug_struct("AggregateRegistry")
            .field("record_types", &types)
            .finish()
    }
}

fn expand_model<M: Model>(
    conn: &Connection,
    record_id: &str,
) -> Result<Option<Vec<RecordRef>>, BoxError> {
    match M::load(conn, record_id)? {
        Some(record) => record.indirect_aggregates(conn).map(Some),
        None => Ok(None),
    }
}

/// Writes one `undertow_event_aggregates` row per aggregate.
pub(crate) fn persist_aggregates(
    conn: &Connection,
    event_id: &Uuid,
    aggregates: &[RecordRef],
) -> Result<(), CaptureError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO undertow_event_aggregates (event_id, aggregate_type, aggregate_id)
         VALUES (?1, ?2, ?3)",
    )?;
    let event_id = event_id.to_string();
    for aggregate in aggregates {
        stmt.execute(params![event_id, aggregate.record_type, aggregate.record_id])?;
    }
    Ok(())
}
