//! Cursor-based pagination for list endpoints.

use serde::{Deserialize, Serialize};

/// Default page size when `count` is not specified.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// Opaque cursor from a previous response.
    pub cursor: Option<String>,
    pub count: Option<u32>,
}

impl PaginationParams {
    /// Page size, clamped to [1, MAX_PAGE_SIZE].
    pub fn effective_count(&self) -> u32 {
        self.count
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// Offset encoded in the cursor; 0 when absent or unreadable.
    pub fn decode_offset(&self) -> u64 {
        self.cursor.as_deref().and_then(decode_cursor).unwrap_or(0)
    }

    /// Slice one page out of `items`.
    pub fn page<T: Clone>(&self, items: &[T]) -> Page<T> {
        let offset = usize::try_from(self.decode_offset()).unwrap_or(usize::MAX);
        let count = self.effective_count();
        let slice: Vec<T> = items
            .iter()
            .skip(offset)
            .take(count as usize)
            .cloned()
            .collect();
        let cursor = if offset.saturating_add(slice.len()) < items.len() {
            next_cursor(offset as u64, slice.len(), count)
        } else {
            None
        };
        Page {
            items: slice,
            cursor,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Encode an offset as an opaque cursor (hex of its big-endian bytes).
pub fn encode_cursor(offset: u64) -> String {
    hex::encode(offset.to_be_bytes())
}

pub fn decode_cursor(cursor: &str) -> Option<u64> {
    let bytes = hex::decode(cursor).ok()?;
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(array))
}

/// Next-page cursor, or `None` once a short page has been returned.
pub fn next_cursor(current_offset: u64, returned: usize, page_size: u32) -> Option<String> {
    if (returned as u32) < page_size {
        None
    } else {
        Some(encode_cursor(current_offset + returned as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip() {
        for offset in [0u64, 1, 42, 100, 123_456_789] {
            assert_eq!(decode_cursor(&encode_cursor(offset)), Some(offset));
        }
        assert_eq!(decode_cursor("zz"), None);
        assert_eq!(decode_cursor("00"), None);
    }

    #[test]
    fn effective_count_defaults_and_clamps() {
        assert_eq!(PaginationParams::default().effective_count(), DEFAULT_PAGE_SIZE);
        let p = PaginationParams {
            cursor: None,
            count: Some(5000),
        };
        assert_eq!(p.effective_count(), MAX_PAGE_SIZE);
    }

    #[test]
    fn pages_walk_to_the_end() {
        let items: Vec<u32> = (0..5).collect();
        let first = PaginationParams {
            cursor: None,
            count: Some(2),
        }
        .page(&items);
        assert_eq!(first.items, vec![0, 1]);

        let second = PaginationParams {
            cursor: first.cursor,
            count: Some(2),
        }
        .page(&items);
        assert_eq!(second.items, vec![2, 3]);

        let last = PaginationParams {
            cursor: second.cursor,
            count: Some(2),
        }
        .page(&items);
        assert_eq!(last.items, vec![4]);
        assert!(last.cursor.is_none());
    }

    #[test]
    fn exact_multiple_has_no_dangling_cursor() {
        let items: Vec<u32> = (0..4).collect();
        let page = PaginationParams {
            cursor: Some(encode_cursor(2)),
            count: Some(2),
        }
        .page(&items);
        assert_eq!(page.items, vec![2, 3]);
        assert!(page.cursor.is_none());
    }
}
