//! Query directives
//!
//! Every `$`-prefixed key of a raw query maps to exactly one `Directive`.
//! An unknown `$` key is an error, never a plain field.

use std::fmt;

/// All directives of the query language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Id,
    Alias,
    Language,
    List,
    Find,
    Traverse,
    Filter,
    Sort,
    Order,
    Recursive,
    Aggregate,
    Function,
    Field,
    Default,
    Inherit,
    Type,
    Merge,
    All,
    FieldsByType,
    Limit,
    Offset,
    Operator,
    Value,
    And,
    Or,
    Name,
    Args,
}

impl Directive {
    /// Parses a `$`-prefixed key
    pub fn parse(key: &str) -> Option<Self> {
        let directive = match key {
            "$id" => Directive::Id,
            "$alias" => Directive::Alias,
            "$language" => Directive::Language,
            "$list" => Directive::List,
            "$find" => Directive::Find,
            "$traverse" => Directive::Traverse,
            "$filter" => Directive::Filter,
            "$sort" => Directive::Sort,
            "$order" => Directive::Order,
            "$recursive" => Directive::Recursive,
            "$aggregate" => Directive::Aggregate,
            "$function" => Directive::Function,
            "$field" => Directive::Field,
            "$default" => Directive::Default,
            "$inherit" => Directive::Inherit,
            "$type" => Directive::Type,
            "$merge" => Directive::Merge,
            "$all" => Directive::All,
            "$fieldsByType" => Directive::FieldsByType,
            "$limit" => Directive::Limit,
            "$offset" => Directive::Offset,
            "$operator" => Directive::Operator,
            "$value" => Directive::Value,
            "$and" => Directive::And,
            "$or" => Directive::Or,
            "$name" => Directive::Name,
            "$args" => Directive::Args,
            _ => return None,
        };
        Some(directive)
    }

    /// The key as written in a query
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Id => "$id",
            Directive::Alias => "$alias",
            Directive::Language => "$language",
            Directive::List => "$list",
            Directive::Find => "$find",
            Directive::Traverse => "$traverse",
            Directive::Filter => "$filter",
            Directive::Sort => "$sort",
            Directive::Order => "$order",
            Directive::Recursive => "$recursive",
            Directive::Aggregate => "$aggregate",
            Directive::Function => "$function",
            Directive::Field => "$field",
            Directive::Default => "$default",
            Directive::Inherit => "$inherit",
            Directive::Type => "$type",
            Directive::Merge => "$merge",
            Directive::All => "$all",
            Directive::FieldsByType => "$fieldsByType",
            Directive::Limit => "$limit",
            Directive::Offset => "$offset",
            Directive::Operator => "$operator",
            Directive::Value => "$value",
            Directive::And => "$and",
            Directive::Or => "$or",
            Directive::Name => "$name",
            Directive::Args => "$args",
        }
    }

    /// Directives that may appear directly on a node object
    pub fn allowed_on_node(&self) -> bool {
        matches!(
            self,
            Directive::Id
                | Directive::Alias
                | Directive::Language
                | Directive::List
                | Directive::Find
                | Directive::Aggregate
                | Directive::Field
                | Directive::Default
                | Directive::Inherit
                | Directive::All
                | Directive::FieldsByType
        )
    }

    /// Directives this one may appear under when it is not a node directive
    pub fn allowed_parents(&self) -> &'static [Directive] {
        match self {
            Directive::Traverse | Directive::Filter | Directive::Recursive => {
                &[Directive::Find, Directive::Aggregate]
            }
            Directive::Sort | Directive::Limit | Directive::Offset => {
                &[Directive::List, Directive::Aggregate]
            }
            Directive::Order => &[Directive::Sort],
            Directive::Function => &[Directive::Aggregate],
            Directive::Type | Directive::Merge => &[Directive::Inherit],
            Directive::Operator | Directive::Value | Directive::And | Directive::Or => {
                &[Directive::Filter]
            }
            Directive::Name | Directive::Args => &[Directive::Function],
            _ => &[],
        }
    }

    /// Directives that turn a node into a traversal
    pub fn is_traversal(&self) -> bool {
        matches!(self, Directive::List | Directive::Find | Directive::Aggregate)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of one key of a query object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKey<'a> {
    /// A known directive
    Directive(Directive),
    /// A plain field name
    Field(&'a str),
    /// A `$` key no directive matches
    Unknown(&'a str),
}

impl<'a> QueryKey<'a> {
    /// Classifies a key
    pub fn classify(key: &'a str) -> Self {
        if key.starts_with('$') {
            match Directive::parse(key) {
                Some(d) => QueryKey::Directive(d),
                None => QueryKey::Unknown(key),
            }
        } else {
            QueryKey::Field(key)
        }
    }
}
