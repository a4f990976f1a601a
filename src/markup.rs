//! HTML-to-text extraction for post bodies.

use scraper::Html;

/// Strips markup from a post body.
pub trait MarkupStripper: Send + Sync {
    fn strip(&self, html: &str) -> String;
}

/// [`MarkupStripper`] backed by `scraper`'s HTML5 parser.
///
/// Concatenates every text node of the fragment, the same result as an XPath
/// `string(.)` over the parsed body. `<br>` tags become newlines so multi-line
/// posts keep their shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlStripper;

impl MarkupStripper for HtmlStripper {
    fn strip(&self, html: &str) -> String {
        let with_breaks = html.replace("<br />", "\n").replace("<br/>", "\n").replace("<br>", "\n");
        let fragment = Html::parse_fragment(&with_breaks);
        fragment.root_element().text().collect::<String>()
    }
}
