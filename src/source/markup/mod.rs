// Markup to plain text conversion for wiki page bodies


use scraper::{Html, Node};

const SKIPPED_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

const BLOCK_ELEMENTS: [&str; 17] = [
    "p", "div", "br", "li", "tr", "table", "ul", "ol", "pre", "blockquote", "h1", "h2", "h3",
    "h4", "h5", "h6", "hr",
];

/// Strip tags from wiki markup and normalise whitespace.
///
/// Block elements start a new line. Every line is trimmed, runs of two or
/// more spaces split a line into separate phrases, and blank lines are dropped.
#[inline]
pub fn clean_content(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut text = String::with_capacity(markup.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => {
                text.push('\n');
            }
            Node::Text(fragment_text) => {
                let skipped = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
                });
                if !skipped {
                    text.push_str(fragment_text);
                }
            }
            _ => {}
        }
    }

    normalize_whitespace(&text)
}

fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
