//! Find/aggregate wire struct
//!
//! Fixed little-endian layout:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 1 | direction |
//! | 1 | 1 | res_type |
//! | 2 | 1 | order |
//! | 3 | 1 | agg_fn |
//! | 4 | 1 | merge_strategy |
//! | 5 | 3 | reserved (zero) |
//! | 8 | 8 | limit (i64) |
//! | 16 | 8 | offset (i64) |
//! | 24 | 4+n | dir_opt_str (u32 length + UTF-8) |
//! | .. | 4+n | order_by_field |
//! | .. | 4+n | res_opt_str |

use super::errors::{ExecutorError, ExecutorResult};

const HEADER_LEN: usize = 24;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> ExecutorResult<Self> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(ExecutorError::Wire(format!(
                        "invalid {} code {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum!(
    /// Traversal direction
    TraversalDirection {
        Node = 1,
        Expression = 2,
        Children = 3,
        Parents = 4,
        BfsAncestors = 5,
        BfsDescendants = 6,
        EdgeField = 7,
        BfsEdgeField = 8,
        BfsExpression = 9,
    }
);

wire_enum!(
    /// Shape of each returned row
    ResultType {
        Fields = 0,
        Ids = 1,
        FieldsRpn = 2,
        InheritRpn = 3,
    }
);

wire_enum!(
    SortOrder {
        None = 0,
        Asc = 1,
        Desc = 2,
    }
);

wire_enum!(
    /// Aggregate function code; `None` for finds
    AggregateFn {
        None = 0,
        Count = 1,
        CountUnique = 2,
        Sum = 3,
        Avg = 4,
        Min = 5,
        Max = 6,
    }
);

wire_enum!(
    /// How inherited object values from several ancestors combine
    MergeStrategy {
        None = 0,
        Named = 1,
        Deep = 2,
    }
);

/// Arguments of `hierarchy.find` / `hierarchy.aggregate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindArgs {
    pub dir: TraversalDirection,
    /// Edge name or traversal expression
    pub dir_opt_str: String,
    pub limit: i64,
    pub offset: i64,
    pub order: SortOrder,
    pub order_by_field: String,
    pub agg_fn: AggregateFn,
    pub merge_strategy: MergeStrategy,
    pub res_type: ResultType,
    /// Field list (newline separated) or field-selection expression
    pub res_opt_str: String,
}

impl Default for FindArgs {
    fn default() -> Self {
        Self {
            dir: TraversalDirection::Node,
            dir_opt_str: String::new(),
            limit: -1,
            offset: 0,
            order: SortOrder::None,
            order_by_field: String::new(),
            agg_fn: AggregateFn::None,
            merge_strategy: MergeStrategy::None,
            res_type: ResultType::Fields,
            res_opt_str: String::new(),
        }
    }
}

impl FindArgs {
    pub fn encode(&self) -> Vec<u8> {
        let strings = [&self.dir_opt_str, &self.order_by_field, &self.res_opt_str];
        let mut buf = Vec::with_capacity(HEADER_LEN + strings.iter().map(|s| 4 + s.len()).sum::<usize>());
        buf.push(self.dir.code());
        buf.push(self.res_type.code());
        buf.push(self.order.code());
        buf.push(self.agg_fn.code());
        buf.push(self.merge_strategy.code());
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.limit.to_le_bytes());
        buf.extend_from_slice(&self.offset.to_le_bytes());
        for s in strings {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> ExecutorResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(ExecutorError::Wire(format!(
                "find args truncated: {} bytes",
                buf.len()
            )));
        }
        let mut i64_at = [0u8; 8];
        i64_at.copy_from_slice(&buf[8..16]);
        let limit = i64::from_le_bytes(i64_at);
        i64_at.copy_from_slice(&buf[16..24]);
        let offset = i64::from_le_bytes(i64_at);

        let mut cursor = HEADER_LEN;
        let mut next_string = || -> ExecutorResult<String> {
            let len_bytes = buf
                .get(cursor..cursor + 4)
                .ok_or_else(|| ExecutorError::Wire("string length truncated".into()))?;
            let mut len = [0u8; 4];
            len.copy_from_slice(len_bytes);
            let len = u32::from_le_bytes(len) as usize;
            cursor += 4;
            let bytes = buf
                .get(cursor..cursor + len)
                .ok_or_else(|| ExecutorError::Wire("string body truncated".into()))?;
            cursor += len;
            String::from_utf8(bytes.to_vec())
                .map_err(|e| ExecutorError::Wire(format!("invalid UTF-8: {}", e)))
        };
        let dir_opt_str = next_string()?;
        let order_by_field = next_string()?;
        let res_opt_str = next_string()?;

        Ok(Self {
            dir: TraversalDirection::from_code(buf[0])?,
            res_type: ResultType::from_code(buf[1])?,
            order: SortOrder::from_code(buf[2])?,
            agg_fn: AggregateFn::from_code(buf[3])?,
            merge_strategy: MergeStrategy::from_code(buf[4])?,
            limit,
            offset,
            dir_opt_str,
            order_by_field,
            res_opt_str,
        })
    }
}
