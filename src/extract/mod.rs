pub mod fields;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::config::SelectorTable;
use crate::record::{BusinessRecord, Field};
use fields::Rule;

struct FieldRule {
    field: Field,
    selector: Selector,
    rule: Rule,
}

/// Maps rendered listing markup to a [`BusinessRecord`].
///
/// Selectors are compiled once; `extract` itself cannot fail.
pub struct Extractor {
    rules: Vec<FieldRule>,
}

impl Extractor {
    pub fn new(selectors: &SelectorTable) -> Result<Self> {
        let rules = fields::table(selectors)
            .into_iter()
            .map(|(field, css, rule)| -> Result<FieldRule> {
                let selector = Selector::parse(css).map_err(|e| {
                    anyhow!("Invalid selector for {}: {:?} ({})", field.id(), css, e)
                })?;
                Ok(FieldRule {
                    field,
                    selector,
                    rule,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn extract(&self, html: &str, url: &str) -> BusinessRecord {
        let doc = Html::parse_document(html);
        let mut record = BusinessRecord::for_url(url);
        for r in &self.rules {
            let value = resolve(&doc, &r.selector, r.rule);
            fields::assign(&mut record, r.field, value);
        }
        record
    }
}

fn resolve(doc: &Html, selector: &Selector, rule: Rule) -> String {
    let mut matches = doc.select(selector);
    match rule {
        Rule::First => matches.next().map(text_of).unwrap_or_default(),
        Rule::FirstJoinLines => matches
            .next()
            .map(|el| text_of(el).replace('\n', ", "))
            .unwrap_or_default(),
        Rule::All { separator } => matches.map(text_of).collect::<Vec<_>>().join(separator),
        Rule::Attr { name } => matches
            .next()
            .and_then(|el| el.value().attr(name))
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Concatenated descendant text, trimmed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
