//! In-memory HTML list rendering for hosts that splice markup into a page.

use crate::poller::decode::ResultItem;
use crate::runtime::sink::{ResultSink, SinkFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemStyle {
    Link,
    PlainText,
}

/// Accumulates result items as `<li>` markup.
///
/// The list only grows: items are appended in render order and never
/// rewritten or removed.
#[derive(Debug)]
pub struct HtmlListSink {
    style: ItemStyle,
    items: Vec<String>,
}

impl HtmlListSink {
    /// Renders each URL as an anchor whose href and text are the URL itself.
    pub fn links() -> Self {
        Self {
            style: ItemStyle::Link,
            items: Vec::new(),
        }
    }

    /// Renders each URL as static text without an anchor.
    pub fn plain_text() -> Self {
        Self {
            style: ItemStyle::PlainText,
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rendered `<li>` fragments in render order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Concatenated markup for every item rendered so far.
    pub fn markup(&self) -> String {
        self.items.concat()
    }

    fn render_item(&self, url: &str) -> String {
        match self.style {
            ItemStyle::Link => format!(
                "<li><a href=\"{}\">{}</a></li>",
                escape_attribute(url),
                escape_text(url)
            ),
            ItemStyle::PlainText => format!("<li>{}</li>", escape_text(url)),
        }
    }
}

impl ResultSink for HtmlListSink {
    fn render<'a>(&'a mut self, item: ResultItem, _position: u64) -> SinkFuture<'a> {
        Box::pin(async move {
            let rendered = self.render_item(item.url());
            self.items.push(rendered);
            Ok(())
        })
    }

    fn shutdown<'a>(&'a mut self) -> SinkFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
