//! Last-seen message tracking for subscriptions.

use std::fmt;
use std::str::FromStr;

use crate::error::HubcapError;
use crate::resource::{Message, Timestamp};

/// Order in which the server returns a batch of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first.
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

impl Order {
    /// Value of the `order-by` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Order::Ascending => "asc",
            Order::Descending => "desc",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = HubcapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Order::Ascending),
            "desc" => Ok(Order::Descending),
            other => Err(HubcapError::config(format!(
                "order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// Marker of the newest message a subscription has seen.
///
/// The marker only moves forward: whatever order a batch arrives in, the
/// cursor takes the newest timestamp it contains, and ignores batches that
/// are empty or older than what it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    last: Option<Timestamp>,
    order: Order,
}

impl Cursor {
    pub fn new(order: Order) -> Self {
        Self { last: None, order }
    }

    /// Timestamp of the newest message seen, if any.
    pub fn last(&self) -> Option<Timestamp> {
        self.last
    }

    /// Order of the most recent retrieval.
    pub fn order(&self) -> Order {
        self.order
    }

    pub(crate) fn set_order(&mut self, order: Order) {
        self.order = order;
    }

    /// Place the marker at an explicit position.
    pub(crate) fn reset(&mut self, last: Option<Timestamp>) {
        self.last = last;
    }

    /// Newest timestamp in a batch.
    pub fn newest(batch: &[Message]) -> Option<Timestamp> {
        batch.iter().map(|m| m.timestamp).max()
    }

    /// Advance past a batch. Returns true if the marker moved.
    pub fn advance(&mut self, batch: &[Message]) -> bool {
        match (Self::newest(batch), self.last) {
            (Some(newest), Some(last)) if newest <= last => false,
            (Some(newest), _) => {
                self.last = Some(newest);
                true
            }
            (None, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cursor_has_no_marker() {
        let cursor = Cursor::new(Order::Descending);
        assert!(cursor.last().is_none());
        assert_eq!(cursor.order(), Order::Descending);
    }

    #[test]
    fn test_empty_batch_leaves_marker() {
        let mut cursor = Cursor::default();
        assert!(!cursor.advance(&[]));
        assert!(cursor.last().is_none());

        cursor.advance(&[Message::at("a", 10)]);
        assert!(!cursor.advance(&[]));
        assert_eq!(cursor.last(), Some(Timestamp(10)));
    }

    #[test]
    fn test_descending_batch_takes_first_element() {
        let mut cursor = Cursor::new(Order::Descending);
        cursor.advance(&[Message::at("two", 20), Message::at("one", 10)]);
        assert_eq!(cursor.last(), Some(Timestamp(20)));
    }

    #[test]
    fn test_ascending_batch_takes_last_element() {
        let mut cursor = Cursor::new(Order::Ascending);
        cursor.advance(&[Message::at("one", 10), Message::at("two", 20)]);
        assert_eq!(cursor.last(), Some(Timestamp(20)));
    }

    #[test]
    fn test_marker_never_moves_backward() {
        let mut cursor = Cursor::default();
        let batches = [
            vec![Message::at("a", 5)],
            vec![Message::at("b", 30), Message::at("c", 25)],
            vec![],
            vec![Message::at("stale", 12)],
            vec![Message::at("d", 31)],
        ];

        let mut seen = Vec::new();
        for batch in &batches {
            cursor.advance(batch);
            seen.push(cursor.last().unwrap());
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(cursor.last(), Some(Timestamp(31)));
    }

    #[test]
    fn test_order_parse() {
        assert_eq!("asc".parse::<Order>().unwrap(), Order::Ascending);
        assert_eq!("desc".parse::<Order>().unwrap(), Order::Descending);
        assert!("sideways".parse::<Order>().is_err());
    }
}
