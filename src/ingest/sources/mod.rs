// src/ingest/sources/mod.rs
// One module per feed. Each exposes a single `RssSource` record; the set
// consumed by a run is whatever `all()` returns.

mod aljazeera;
mod bbc;
mod france24;
mod guardian;
mod nyt;
mod scmp;
mod un_news;

pub use aljazeera::ALJAZEERA;
pub use bbc::BBC;
pub use france24::FRANCE24;
pub use guardian::GUARDIAN;
pub use nyt::NYT;
pub use scmp::SCMP;
pub use un_news::UN_NEWS;

use crate::ingest::types::RssSource;

pub fn all() -> Vec<RssSource> {
    vec![ALJAZEERA, BBC, GUARDIAN, NYT, SCMP, FRANCE24, UN_NEWS]
}

use crate::ingest::types::TextValue;

/// Non-empty trimmed guid text, if any.
pub(crate) fn guid_text(guid: Option<&TextValue>) -> Option<String> {
    guid.map(|g| g.text().trim().to_string())
        .filter(|g| !g.is_empty())
}

/// Category labels, empty entries dropped.
pub(crate) fn category_labels(categories: &[TextValue]) -> Vec<String> {
    categories
        .iter()
        .map(|c| c.text().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}
