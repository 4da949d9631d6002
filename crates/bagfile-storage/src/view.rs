//! Time-Ordered Views
//!
//! A `View` answers the replay question: "give me everything on these
//! topics, between these times, in time order", across per-topic indexes
//! that are each only in *insertion* order.
//!
//! ## Queries
//!
//! A [`Query`] is a time interval with inclusive begin and exclusive end
//! (`begin <= t < end`) plus a topic filter. The filter is a tagged
//! predicate: match everything, match a topic list, or match an arbitrary
//! predicate over the topic's schema snapshot.
//!
//! ## Ranges and merging
//!
//! `add_query` binary-searches each matching topic's index for the query's
//! time bounds and keeps the resulting `[lo, hi)` slice as a range. The
//! iterator owns a min-heap with one cursor per non-exhausted range, keyed
//! by `(time, range, position)`, a total order, so ties between topics
//! resolve the same way for the lifetime of the view. Each `next()` pops
//! the earliest cursor, yields its [`MessageInstance`], and re-pushes the
//! advanced cursor while its range has entries left.
//!
//! Termination is iterator-based, not time-based: the ranges are fixed when
//! `add_query` runs, and the bag is immutable while views exist.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bagfile_core::index::IndexEntry;
use bagfile_core::time::Time;
use bagfile_core::topic::MsgInfo;

use crate::instance::MessageInstance;
use crate::reader::Bag;

/// Topic filter half of a query
pub enum QueryFilter {
    /// Every topic in the bag
    All,
    /// Topics whose name appears in the list
    Topics(Vec<String>),
    /// Arbitrary predicate over the topic's schema snapshot
    Predicate(Box<dyn Fn(&MsgInfo) -> bool + Send + Sync>),
}

/// A topic/time filter over a bag's contents
pub struct Query {
    begin: Time,
    end: Time,
    filter: QueryFilter,
}

impl Query {
    /// Everything, over all time
    pub fn all() -> Self {
        Self {
            begin: Time::MIN,
            end: Time::MAX,
            filter: QueryFilter::All,
        }
    }

    /// Only the named topics, over all time
    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            begin: Time::MIN,
            end: Time::MAX,
            filter: QueryFilter::Topics(topics.into_iter().map(Into::into).collect()),
        }
    }

    /// Topics accepted by `predicate`, over all time
    pub fn predicate(predicate: impl Fn(&MsgInfo) -> bool + Send + Sync + 'static) -> Self {
        Self {
            begin: Time::MIN,
            end: Time::MAX,
            filter: QueryFilter::Predicate(Box::new(predicate)),
        }
    }

    /// Narrow the interval to `begin <= t` (inclusive)
    pub fn since(mut self, begin: Time) -> Self {
        self.begin = begin;
        self
    }

    /// Narrow the interval to `t < end` (exclusive)
    pub fn until(mut self, end: Time) -> Self {
        self.end = end;
        self
    }

    pub fn begin(&self) -> Time {
        self.begin
    }

    pub fn end(&self) -> Time {
        self.end
    }

    /// Whether a topic's schema snapshot passes the filter
    pub fn evaluate(&self, info: &MsgInfo) -> bool {
        match &self.filter {
            QueryFilter::All => true,
            QueryFilter::Topics(topics) => topics.iter().any(|t| t == &info.topic),
            QueryFilter::Predicate(predicate) => predicate(info),
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filter = match &self.filter {
            QueryFilter::All => "All".to_string(),
            QueryFilter::Topics(topics) => format!("Topics({:?})", topics),
            QueryFilter::Predicate(_) => "Predicate(..)".to_string(),
        };
        f.debug_struct("Query")
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("filter", &filter)
            .finish()
    }
}

/// A contiguous slice of one topic's index selected by a query
struct MessageRange<'a> {
    entries: &'a [IndexEntry],
    info: &'a MsgInfo,
    bag: &'a Bag,
}

/// A set of query results over one or more bags, iterable in time order
#[derive(Default)]
pub struct View<'a> {
    ranges: Vec<MessageRange<'a>>,
    size: usize,
}

impl<'a> View<'a> {
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            size: 0,
        }
    }

    /// Add every matching `[lo, hi)` index slice of `bag` to the view
    pub fn add_query(&mut self, bag: &'a Bag, query: &Query) {
        for info in bag.topics() {
            if !query.evaluate(info) {
                continue;
            }
            let Some(entries) = bag.index(&info.topic) else {
                continue;
            };
            let lo = entries.partition_point(|e| e.time < query.begin());
            let hi = entries.partition_point(|e| e.time < query.end());
            if lo < hi {
                self.size += hi - lo;
                self.ranges.push(MessageRange {
                    entries: &entries[lo..hi],
                    info,
                    bag,
                });
            }
        }
    }

    /// Total number of messages the view will yield, fixed at query time
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Iterate all selected messages in non-decreasing time order
    pub fn iter(&self) -> ViewIter<'_, 'a> {
        let mut heap = BinaryHeap::with_capacity(self.ranges.len());
        for (range_idx, range) in self.ranges.iter().enumerate() {
            // add_query only keeps non-empty ranges
            heap.push(Cursor {
                time: range.entries[0].time,
                range: range_idx,
                idx: 0,
            });
        }
        ViewIter {
            view: self,
            heap,
            remaining: self.size,
        }
    }
}

impl<'v, 'a> IntoIterator for &'v View<'a> {
    type Item = MessageInstance<'a>;
    type IntoIter = ViewIter<'v, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One range's position in the merge
#[derive(Debug, PartialEq, Eq)]
struct Cursor {
    time: Time,
    range: usize,
    idx: usize,
}

// BinaryHeap is a max-heap; reversing the comparison makes the earliest
// cursor surface first. The (range, idx) tail makes the order total, so
// equal timestamps tie-break identically for the lifetime of the view.
impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time, other.range, other.idx).cmp(&(self.time, self.range, self.idx))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered merge iterator over a view's ranges
pub struct ViewIter<'v, 'a> {
    view: &'v View<'a>,
    heap: BinaryHeap<Cursor>,
    remaining: usize,
}

impl<'v, 'a> Iterator for ViewIter<'v, 'a> {
    type Item = MessageInstance<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let top = self.heap.pop()?;
        let range = &self.view.ranges[top.range];
        let entries: &'a [IndexEntry] = range.entries;
        let instance = MessageInstance::new(range.info, &entries[top.idx], range.bag);

        let next_idx = top.idx + 1;
        if next_idx < entries.len() {
            self.heap.push(Cursor {
                time: entries[next_idx].time,
                range: top.range,
                idx: next_idx,
            });
        }
        self.remaining -= 1;
        Some(instance)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ViewIter<'_, '_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BagWriter;
    use bagfile_core::error::{Error, Result};
    use bagfile_core::message::{ConnectionHeader, Message};
    use tempfile::TempDir;

    struct Beacon {
        id: u32,
    }

    impl Message for Beacon {
        fn datatype() -> String {
            "test_msgs/Beacon".to_string()
        }
        fn md5sum() -> String {
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string()
        }
        fn definition() -> String {
            "uint32 id\n".to_string()
        }
        fn serialized_length(&self) -> u32 {
            4
        }
        fn serialize(&self, buf: &mut [u8]) {
            buf.copy_from_slice(&self.id.to_le_bytes());
        }
        fn deserialize(buf: &[u8], _connection: &ConnectionHeader) -> Result<Self> {
            Ok(Self {
                id: u32::from_le_bytes(buf.try_into().map_err(|_| {
                    Error::BadFormat("Beacon payload must be 4 bytes".to_string())
                })?),
            })
        }
    }

    fn info(topic: &str) -> MsgInfo {
        MsgInfo::new(topic, "test_msgs/Beacon", Beacon::md5sum(), "uint32 id\n")
    }

    // ---------------------------------------------------------------
    // Query construction and evaluation
    // ---------------------------------------------------------------

    #[test]
    fn test_query_all_matches_everything() {
        let q = Query::all();
        assert!(q.evaluate(&info("/a")));
        assert!(q.evaluate(&info("/b")));
        assert_eq!(q.begin(), Time::MIN);
        assert_eq!(q.end(), Time::MAX);
    }

    #[test]
    fn test_query_topics_filters_by_name() {
        let q = Query::topics(["/a", "/c"]);
        assert!(q.evaluate(&info("/a")));
        assert!(!q.evaluate(&info("/b")));
        assert!(q.evaluate(&info("/c")));
    }

    #[test]
    fn test_query_predicate() {
        let q = Query::predicate(|info| info.datatype.starts_with("test_msgs/"));
        assert!(q.evaluate(&info("/anything")));
        let q = Query::predicate(|info| info.datatype.starts_with("nav_msgs/"));
        assert!(!q.evaluate(&info("/anything")));
    }

    #[test]
    fn test_query_interval_builders() {
        let q = Query::all().since(Time::new(2, 0)).until(Time::new(4, 0));
        assert_eq!(q.begin(), Time::new(2, 0));
        assert_eq!(q.end(), Time::new(4, 0));
    }

    // ---------------------------------------------------------------
    // Merge behavior over a real bag
    // ---------------------------------------------------------------

    fn two_topic_bag(dir: &TempDir) -> Bag {
        let path = dir.path().join("view.bag");
        let writer = BagWriter::create(&path).unwrap();
        // /a at t=1 and t=3, /b at t=2 and t=4
        writer.write("/a", Time::new(1, 0), &Beacon { id: 1 }).unwrap();
        writer.write("/b", Time::new(2, 0), &Beacon { id: 2 }).unwrap();
        writer.write("/a", Time::new(3, 0), &Beacon { id: 3 }).unwrap();
        writer.write("/b", Time::new(4, 0), &Beacon { id: 4 }).unwrap();
        writer.close().unwrap();
        Bag::open(&path).unwrap()
    }

    #[test]
    fn test_merge_interleaves_topics_by_time() {
        let dir = TempDir::new().unwrap();
        let bag = two_topic_bag(&dir);
        let mut view = View::new();
        view.add_query(&bag, &Query::all());

        let order: Vec<(String, Time)> = view
            .iter()
            .map(|m| (m.topic().to_string(), m.time()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("/a".to_string(), Time::new(1, 0)),
                ("/b".to_string(), Time::new(2, 0)),
                ("/a".to_string(), Time::new(3, 0)),
                ("/b".to_string(), Time::new(4, 0)),
            ]
        );
    }

    #[test]
    fn test_size_is_precomputed() {
        let dir = TempDir::new().unwrap();
        let bag = two_topic_bag(&dir);
        let mut view = View::new();
        view.add_query(&bag, &Query::all());
        assert_eq!(view.size(), 4);
        assert_eq!(view.iter().len(), 4);

        let mut narrow = View::new();
        narrow.add_query(&bag, &Query::topics(["/b"]));
        assert_eq!(narrow.size(), 2);
    }

    #[test]
    fn test_time_window_is_half_open() {
        let dir = TempDir::new().unwrap();
        let bag = two_topic_bag(&dir);
        let mut view = View::new();
        view.add_query(
            &bag,
            &Query::all().since(Time::new(2, 0)).until(Time::new(4, 0)),
        );

        let times: Vec<Time> = view.iter().map(|m| m.time()).collect();
        // t=2 included (inclusive begin), t=4 excluded (exclusive end)
        assert_eq!(times, vec![Time::new(2, 0), Time::new(3, 0)]);
    }

    #[test]
    fn test_empty_window_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let bag = two_topic_bag(&dir);
        let mut view = View::new();
        view.add_query(
            &bag,
            &Query::all().since(Time::new(10, 0)).until(Time::new(20, 0)),
        );
        assert!(view.is_empty());
        assert_eq!(view.iter().count(), 0);
    }

    #[test]
    fn test_equal_timestamps_tie_break_stably() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ties.bag");
        let writer = BagWriter::create(&path).unwrap();
        let t = Time::new(5, 0);
        writer.write("/x", t, &Beacon { id: 1 }).unwrap();
        writer.write("/y", t, &Beacon { id: 2 }).unwrap();
        writer.write("/x", t, &Beacon { id: 3 }).unwrap();
        writer.close().unwrap();
        let bag = Bag::open(&path).unwrap();

        let mut view = View::new();
        view.add_query(&bag, &Query::all());
        let first: Vec<String> = view.iter().map(|m| m.topic().to_string()).collect();
        let second: Vec<String> = view.iter().map(|m| m.topic().to_string()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_multiple_queries_accumulate() {
        let dir = TempDir::new().unwrap();
        let bag = two_topic_bag(&dir);
        let mut view = View::new();
        view.add_query(&bag, &Query::topics(["/a"]));
        view.add_query(&bag, &Query::topics(["/b"]));
        assert_eq!(view.size(), 4);

        let times: Vec<Time> = view.iter().map(|m| m.time()).collect();
        assert_eq!(
            times,
            vec![
                Time::new(1, 0),
                Time::new(2, 0),
                Time::new(3, 0),
                Time::new(4, 0)
            ]
        );
    }
}
