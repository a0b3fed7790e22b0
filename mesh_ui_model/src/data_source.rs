//! Mesh UI Model: Data Source Descriptors
//!
//! Tables and forms name their rows with a declarative string:
//!
//!   sourceKind;:;maxRecords;:;sortDescending;:;filterExpr[;:;page]
//!
//! Decoded once at the boundary into [`DataSource`]. Trailing fields may be
//! omitted; `maxRecords` 0 means unlimited.
//!
//! Filter grammar: clauses joined by `&&`, each `name=value`,
//! `name!=value` or `name~value` (case-insensitive contains).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attribute_bag::AttributeBag;
use crate::error::{ModelError, ModelResult};
use crate::record::Record;

/// Separator between data-source fields.
pub const FIELD_SEPARATOR: &str = ";:;";

/// Separator between filter clauses.
pub const CLAUSE_SEPARATOR: &str = "&&";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equals => "=",
            FilterOp::NotEquals => "!=",
            FilterOp::Contains => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub name: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterClause {
    fn parse(raw: &str) -> ModelResult<Self> {
        // Earliest operator wins; `!=` sorts before the `=` inside it.
        let (pos, op, width) = [
            (raw.find("!="), FilterOp::NotEquals, 2),
            (raw.find('~'), FilterOp::Contains, 1),
            (raw.find('='), FilterOp::Equals, 1),
        ]
        .into_iter()
        .filter_map(|(pos, op, width)| pos.map(|p| (p, op, width)))
        .min_by_key(|(pos, _, _)| *pos)
        .ok_or_else(|| ModelError::MalformedFilter(raw.to_string()))?;
        let name = raw[..pos].trim();
        if name.is_empty() {
            return Err(ModelError::MalformedFilter(raw.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            op,
            value: raw[pos + width..].trim().to_string(),
        })
    }

    pub fn matches(&self, fields: &AttributeBag) -> bool {
        let actual = fields.get(&self.name);
        match self.op {
            FilterOp::Equals => actual == self.value,
            FilterOp::NotEquals => actual != self.value,
            FilterOp::Contains => actual
                .to_lowercase()
                .contains(&self.value.to_lowercase()),
        }
    }
}

/// Conjunction of clauses. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn parse(raw: &str) -> ModelResult<Self> {
        let clauses = raw
            .split(CLAUSE_SEPARATOR)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(FilterClause::parse)
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, fields: &AttributeBag) -> bool {
        self.clauses.iter().all(|c| c.matches(fields))
    }

    pub fn encode(&self) -> String {
        self.clauses
            .iter()
            .map(|c| format!("{}{}{}", c.name, c.op.as_str(), c.value))
            .collect::<Vec<_>>()
            .join(CLAUSE_SEPARATOR)
    }
}

/// Decoded data-source descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub source_kind: String,
    pub max_records: usize,
    pub sort_descending: bool,
    pub filter: Filter,
    pub page: Option<usize>,
}

/// Rows selected by a data source, with the pre-paging match count.
#[derive(Debug, Clone)]
pub struct Selection {
    pub total: usize,
    pub page: usize,
    pub records: Vec<Record>,
}

impl DataSource {
    pub fn new(source_kind: &str) -> Self {
        Self {
            source_kind: source_kind.to_string(),
            max_records: 0,
            sort_descending: false,
            filter: Filter::default(),
            page: None,
        }
    }

    pub fn parse(input: &str) -> ModelResult<Self> {
        let malformed = |reason: &str| ModelError::MalformedDataSource {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = input.split(FIELD_SEPARATOR).collect();
        if fields.len() > 5 {
            return Err(malformed("too many fields"));
        }

        let source_kind = fields[0].trim();
        if source_kind.is_empty() {
            return Err(malformed("empty source kind"));
        }

        let max_records = match fields.get(1).map(|s| s.trim()) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| malformed("maxRecords is not a number"))?,
        };

        let sort_descending = match fields.get(2).map(|s| s.trim()) {
            None | Some("") => false,
            Some(raw) if raw.eq_ignore_ascii_case("true") => true,
            Some(raw) if raw.eq_ignore_ascii_case("false") => false,
            Some(_) => return Err(malformed("sortDescending must be true or false")),
        };

        let filter = match fields.get(3) {
            None => Filter::default(),
            Some(raw) => Filter::parse(raw)?,
        };

        let page = match fields.get(4).map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| malformed("page is not a number"))?,
            ),
        };

        Ok(Self {
            source_kind: source_kind.to_string(),
            max_records,
            sort_descending,
            filter,
            page,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.source_kind,
            self.max_records,
            self.sort_descending,
            self.filter.encode(),
            sep = FIELD_SEPARATOR
        );
        if let Some(page) = self.page {
            out.push_str(FIELD_SEPARATOR);
            out.push_str(&page.to_string());
        }
        out
    }

    /// Filter, sort by sequence, then page the given rows.
    pub fn select(&self, records: Vec<Record>) -> Selection {
        let mut matched: Vec<Record> = records
            .into_iter()
            .filter(|r| self.filter.matches(&r.fields))
            .collect();
        matched.sort_by_key(|r| r.sequence);
        if self.sort_descending {
            matched.reverse();
        }

        let total = matched.len();
        let page = self.page.unwrap_or(0);
        let records = if self.max_records == 0 {
            matched
        } else {
            matched
                .into_iter()
                .skip(page.saturating_mul(self.max_records))
                .take(self.max_records)
                .collect()
        };

        Selection { total, page, records }
    }
}

impl FromStr for DataSource {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataSource::parse(s)
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
