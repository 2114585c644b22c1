//! Taking over server-rendered markup with the morph strategy.
//!
//! The document starts out holding markup the application did not render.
//! The first pass adopts it in place, then third parties (an extension that
//! injects a banner, a translator that wraps text in `<font>`) edit the tree
//! between passes and the next passes work around them.

use spark_vdom::dom::Document;
use spark_vdom::vdom::{Html, attribute, node, style, text};
use spark_vdom::{Config, NodeId, Root};
use tracing_subscriber::EnvFilter;

fn view(greeting: &str, count: u32) -> Html {
    node(
        "main",
        [attribute("id", "app")],
        [
            node("h1", [], [text(greeting)]),
            node("p", [style("color", "gray")], [text(format!("{count} visits"))]),
        ],
    )
}

/// What a server would have sent for `view("Hello", 1)`.
fn server_markup(doc: &mut Document) -> spark_vdom::DomResult<NodeId> {
    let main = doc.create_element("main", None);
    doc.set_attribute(main, "id", "app")?;
    let h1 = doc.create_element("h1", None);
    let hello = doc.create_text("Hello");
    doc.append_child(h1, hello)?;
    let p = doc.create_element("p", None);
    doc.set_style(p, "color", "gray")?;
    let visits = doc.create_text("1 visits");
    doc.append_child(p, visits)?;
    doc.append_child(main, h1)?;
    doc.append_child(main, p)?;
    Ok(main)
}

fn main() -> spark_vdom::DomResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut doc = Document::new();
    let body = doc.create_element("body", None);
    let main = server_markup(&mut doc)?;
    doc.append_child(body, main)?;
    let h1 = doc.first_child(main);
    println!("server:     {}", doc.to_markup(body));

    let mut root = Root::mount(main, |_| {}, Config::new().adopt_existing(true));
    root.step(&mut doc, view("Hello", 1))?;
    println!("adopted:    {}", doc.to_markup(body));
    println!("h1 reused:  {}", doc.first_child(main) == h1);

    // an extension injects a banner
    let banner = doc.create_element("aside", None);
    let note = doc.create_text("extension banner");
    doc.append_child(banner, note)?;
    doc.insert_before(main, banner, h1)?;

    // a translator wraps the heading text
    if let Some(h1) = h1 {
        if let Some(original) = doc.first_child(h1) {
            let font = doc.create_element("font", None);
            let translated = doc.create_text("Hallo");
            doc.append_child(font, translated)?;
            doc.replace_child(h1, font, original)?;
            doc.discard(original)?;
        }
    }
    println!("edited:     {}", doc.to_markup(body));

    root.step(&mut doc, view("Hello", 2))?;
    println!("same text:  {}", doc.to_markup(body));

    root.step(&mut doc, view("Welcome back", 3))?;
    println!("new text:   {}", doc.to_markup(body));
    Ok(())
}
