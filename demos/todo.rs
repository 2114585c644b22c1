//! Todo list driven by simulated clicks.
//!
//! Run with `RUST_LOG=spark_vdom=debug cargo run --example todo` to watch
//! each pass. Pass `diff` as the first argument to use the diff/patch
//! strategy instead of morph.

use std::cell::RefCell;
use std::rc::Rc;

use spark_vdom::dom::{Document, Event};
use spark_vdom::vdom::{Html, attribute, class, keyed_node, lazy, map, node, on_message, text};
use spark_vdom::{Config, NodeId, Root, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
enum Msg {
    Add,
    Toggle(u32),
    Remove(u32),
    MoveToTop(u32),
}

#[derive(Debug, Clone)]
struct Item {
    id: u32,
    title: String,
    done: bool,
}

#[derive(Default)]
struct Model {
    items: Vec<Rc<Item>>,
    next_id: u32,
}

impl Model {
    fn update(&mut self, msg: Msg) {
        match msg {
            Msg::Add => {
                self.next_id += 1;
                self.items.push(Rc::new(Item {
                    id: self.next_id,
                    title: format!("task {}", self.next_id),
                    done: false,
                }));
            }
            Msg::Toggle(id) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
                    let mut toggled = (**item).clone();
                    toggled.done = !toggled.done;
                    *item = Rc::new(toggled);
                }
            }
            Msg::Remove(id) => self.items.retain(|i| i.id != id),
            Msg::MoveToTop(id) => {
                if let Some(at) = self.items.iter().position(|i| i.id == id) {
                    let item = self.items.remove(at);
                    self.items.insert(0, item);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum RowMsg {
    Toggle,
    Remove,
    Top,
}

fn view_item(item: &Item) -> Html {
    node(
        "li",
        [class(if item.done { "done" } else { "open" })],
        [
            node("span", [on_message("click", RowMsg::Toggle)], [text(item.title.as_str())]),
            node("button", [on_message("click", RowMsg::Top)], [text("top")]),
            node("button", [on_message("click", RowMsg::Remove)], [text("x")]),
        ],
    )
}

fn view(model: &Model, view_row: &Rc<fn(&Item) -> Html>) -> Html {
    let rows = model.items.iter().map(|item| {
        let id = item.id;
        let row = map(
            move |msg: RowMsg| match msg {
                RowMsg::Toggle => Msg::Toggle(id),
                RowMsg::Remove => Msg::Remove(id),
                RowMsg::Top => Msg::MoveToTop(id),
            },
            lazy(view_row, item),
        );
        (id.to_string(), row)
    });
    node(
        "div",
        [attribute("id", "todo")],
        [
            node("button", [on_message("click", Msg::Add)], [text("add")]),
            keyed_node("ul", [], rows),
        ],
    )
}

type Action = Box<dyn Fn(&Document, &Root)>;

fn click(doc: &Document, target: NodeId) {
    if let Err(err) = doc.dispatch_event(target, &Event::new("click")) {
        tracing::warn!(%err, "click failed");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let strategy = match std::env::args().nth(1).as_deref() {
        Some("diff") => Strategy::DiffPatch,
        _ => Strategy::Morph,
    };

    let mut doc = Document::new();
    let body = doc.create_element("body", None);
    let mount = doc.create_element("div", None);
    doc.append_child(body, mount).expect("fresh nodes");

    let queue: Rc<RefCell<Vec<Msg>>> = Rc::default();
    let sink = queue.clone();
    let mut root = Root::mount(
        mount,
        move |msg| {
            if let Ok(msg) = msg.downcast::<Msg>() {
                sink.borrow_mut().push(*msg);
            }
        },
        Config::new().strategy(strategy).time_label("todo"),
    );

    let view_row: Rc<fn(&Item) -> Html> = Rc::new(view_item);
    let mut model = Model::default();
    root.step(&mut doc, view(&model, &view_row)).expect("first pass");

    // add, add, add, toggle the second, move the third to the top, remove the first
    let add = |doc: &Document, root: &Root| {
        click(doc, doc.child_at(root.node(), 0).expect("add button"))
    };
    let row_button = |doc: &Document, root: &Root, row: usize, button: usize| {
        let list = doc.child_at(root.node(), 1).expect("list");
        let item = doc.child_at(list, row).expect("row");
        click(doc, doc.child_at(item, button).expect("row button"));
    };
    let script: Vec<Action> = vec![
        Box::new(add) as Action,
        Box::new(add),
        Box::new(add),
        Box::new(move |doc: &Document, root: &Root| row_button(doc, root, 1, 0)),
        Box::new(move |doc: &Document, root: &Root| row_button(doc, root, 2, 1)),
        Box::new(move |doc: &Document, root: &Root| row_button(doc, root, 1, 2)),
    ];

    for action in script {
        action(&doc, &root);
        let pending: Vec<Msg> = queue.borrow_mut().drain(..).collect();
        for msg in pending {
            println!("-> {msg:?}");
            model.update(msg);
        }
        root.step(&mut doc, view(&model, &view_row)).expect("pass");
        println!("{}", doc.to_markup(root.node()));
    }
}
