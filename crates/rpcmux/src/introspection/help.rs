//! Documentation rendering for `system.methodHelp`.

use pulldown_cmark::{Options, Parser, html};

use crate::registry::{HelpFormat, ProcedureEntry};

/// Renders Markdown to an HTML fragment.
#[must_use]
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut rendered = String::with_capacity(text.len());
    html::push_html(&mut rendered, parser);
    rendered
}

/// Help text for an entry: rendered when it is Markdown and rendering is on.
pub(crate) fn entry_help(entry: &ProcedureEntry, render: bool) -> String {
    match entry.help_format() {
        HelpFormat::Markdown if render => render_markdown(entry.help()),
        HelpFormat::Markdown | HelpFormat::Plain => entry.help().to_owned(),
    }
}
