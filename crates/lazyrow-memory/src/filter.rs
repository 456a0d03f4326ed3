//! Filter language evaluated against record properties.

use std::cmp::Ordering;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// A condition on one or more record properties.
///
/// Property values are read through the record accessor, so a property name
/// means whatever the accessor makes of it. Comparisons follow SQL: a missing
/// or null value, or a value of a different type, matches no comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter<I> {
    Equal { property: String, value: Value },
    Greater { property: String, value: Value },
    GreaterOrEqual { property: String, value: Value },
    Less { property: String, value: Value },
    LessOrEqual { property: String, value: Value },
    /// Inclusive on both ends.
    Between {
        property: String,
        start: Value,
        end: Value,
    },
    /// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
    Like {
        property: String,
        pattern: String,
        case_sensitive: bool,
    },
    /// Case-insensitive substring match.
    Contains { property: String, text: String },
    IsNull { property: String },
    Not(Box<Filter<I>>),
    /// Matches when every filter matches; an empty list matches everything.
    And(Vec<Filter<I>>),
    /// Matches when any filter matches; an empty list matches nothing.
    Or(Vec<Filter<I>>),
    /// The row with this identity.
    Identity(I),
}

impl<I> Filter<I> {
    pub fn equal(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equal {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn greater(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Greater {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn less(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Less {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn between(
        property: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        Filter::Between {
            property: property.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            property: property.into(),
            pattern: pattern.into(),
            case_sensitive: true,
        }
    }

    pub fn contains(property: impl Into<String>, text: impl Into<String>) -> Self {
        Filter::Contains {
            property: property.into(),
            text: text.into(),
        }
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Filter::IsNull {
            property: property.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter<I>) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Every property this filter reads, in order of appearance.
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Equal { property, .. }
            | Filter::Greater { property, .. }
            | Filter::GreaterOrEqual { property, .. }
            | Filter::Less { property, .. }
            | Filter::LessOrEqual { property, .. }
            | Filter::Between { property, .. }
            | Filter::Like { property, .. }
            | Filter::Contains { property, .. }
            | Filter::IsNull { property } => out.push(property),
            Filter::Not(inner) => inner.collect_properties(out),
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.collect_properties(out);
                }
            }
            Filter::Identity(_) => {}
        }
    }
}

impl<I: fmt::Debug> fmt::Display for Filter<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equal { property, value } => write!(f, "{property} == {value}"),
            Filter::Greater { property, value } => write!(f, "{property} > {value}"),
            Filter::GreaterOrEqual { property, value } => write!(f, "{property} >= {value}"),
            Filter::Less { property, value } => write!(f, "{property} < {value}"),
            Filter::LessOrEqual { property, value } => write!(f, "{property} <= {value}"),
            Filter::Between {
                property,
                start,
                end,
            } => write!(f, "{property} between {start} and {end}"),
            Filter::Like {
                property,
                pattern,
                case_sensitive,
            } => {
                let op = if *case_sensitive { "like" } else { "ilike" };
                write!(f, "{property} {op} {pattern:?}")
            }
            Filter::Contains { property, text } => write!(f, "{property} contains {text:?}"),
            Filter::IsNull { property } => write!(f, "{property} is null"),
            Filter::Not(inner) => write!(f, "not ({inner})"),
            Filter::And(filters) => join(f, filters, " and "),
            Filter::Or(filters) => join(f, filters, " or "),
            Filter::Identity(id) => write!(f, "id == {id:?}"),
        }
    }
}

fn join<I: fmt::Debug>(f: &mut fmt::Formatter<'_>, filters: &[Filter<I>], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{filter}")?;
    }
    write!(f, ")")
}

/// Order two JSON values of the same kind.
///
/// Numbers compare numerically regardless of representation, strings
/// lexicographically, booleans with `false < true`. Null, arrays, objects
/// and values of different kinds are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Some(a.cmp(&b))
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                Some(a.cmp(&b))
            } else {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Total order used for sorting: missing and null first, then by kind
/// (booleans, numbers, strings, others), then by value.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Translate a `LIKE` pattern into an anchored regex.
pub fn like_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if c == '%' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .dot_matches_new_line(true)
        .build()
}

/// A filter ready for repeated evaluation, with patterns compiled once.
pub(crate) enum Matcher<'f, I> {
    Leaf(&'f Filter<I>),
    Like { property: &'f str, regex: Regex },
    Not(Box<Matcher<'f, I>>),
    And(Vec<Matcher<'f, I>>),
    Or(Vec<Matcher<'f, I>>),
}

impl<'f, I: PartialEq> Matcher<'f, I> {
    pub(crate) fn compile(filter: &'f Filter<I>) -> Result<Self, regex::Error> {
        Ok(match filter {
            Filter::Like {
                property,
                pattern,
                case_sensitive,
            } => Matcher::Like {
                property,
                regex: like_regex(pattern, *case_sensitive)?,
            },
            Filter::Not(inner) => Matcher::Not(Box::new(Matcher::compile(inner)?)),
            Filter::And(filters) => Matcher::And(
                filters
                    .iter()
                    .map(Matcher::compile)
                    .collect::<Result<_, _>>()?,
            ),
            Filter::Or(filters) => Matcher::Or(
                filters
                    .iter()
                    .map(Matcher::compile)
                    .collect::<Result<_, _>>()?,
            ),
            leaf => Matcher::Leaf(leaf),
        })
    }

    /// Evaluate against one row, given its identity and a property reader.
    pub(crate) fn matches(&self, id: &I, read: &impl Fn(&str) -> Option<Value>) -> bool {
        match self {
            Matcher::Like { property, regex } => match read(property) {
                Some(Value::String(s)) => regex.is_match(&s),
                _ => false,
            },
            Matcher::Not(inner) => !inner.matches(id, read),
            Matcher::And(matchers) => matchers.iter().all(|m| m.matches(id, read)),
            Matcher::Or(matchers) => matchers.iter().any(|m| m.matches(id, read)),
            Matcher::Leaf(filter) => leaf_matches(filter, id, read),
        }
    }
}

fn leaf_matches<I: PartialEq>(filter: &Filter<I>, id: &I, read: &impl Fn(&str) -> Option<Value>) -> bool {
    let compare = |property: &str, expected: &Value| {
        read(property).and_then(|actual| compare_values(&actual, expected))
    };

    match filter {
        Filter::Equal { property, value } => compare(property, value) == Some(Ordering::Equal),
        Filter::Greater { property, value } => compare(property, value) == Some(Ordering::Greater),
        Filter::GreaterOrEqual { property, value } => {
            matches!(compare(property, value), Some(Ordering::Greater | Ordering::Equal))
        }
        Filter::Less { property, value } => compare(property, value) == Some(Ordering::Less),
        Filter::LessOrEqual { property, value } => {
            matches!(compare(property, value), Some(Ordering::Less | Ordering::Equal))
        }
        Filter::Between {
            property,
            start,
            end,
        } => {
            matches!(compare(property, start), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare(property, end), Some(Ordering::Less | Ordering::Equal))
        }
        Filter::Contains { property, text } => match read(property) {
            Some(Value::String(s)) => s.to_lowercase().contains(&text.to_lowercase()),
            _ => false,
        },
        Filter::IsNull { property } => matches!(read(property), None | Some(Value::Null)),
        Filter::Identity(expected) => id == expected,
        // Composite filters are compiled into their own matcher variants
        Filter::Like { .. } | Filter::Not(_) | Filter::And(_) | Filter::Or(_) => false,
    }
}
