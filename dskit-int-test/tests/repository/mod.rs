mod repository_aggregate_test;
mod repository_crud_test;
mod repository_list_test;
mod repository_negative_test;

use dskit::entity::EntityMeta;
use dskit::store::Key;
use dskit::{Convertible, Entity};
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;

#[derive(Debug, Convertible, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    Draft,
    Active,
    Retired,
}

#[derive(Debug, Convertible, Default, Clone, PartialEq)]
#[converter(ignored = "label")]
pub struct Dimensions {
    pub width: i64,
    pub height: i64,
    pub label: String,
}

#[derive(Debug, Entity, Default, Clone, PartialEq)]
#[entity(kind = "Widget", updated(enabled = true))]
pub struct Widget {
    #[entity(meta)]
    pub meta: EntityMeta,
    pub name: String,
    pub size: i64,
    pub weight: f64,
    pub tags: Vec<String>,
    #[entity(no_index)]
    pub description: String,
    pub status: Status,
    pub dimensions: Option<Dimensions>,
}

/// A child record, created under a [`Widget`] key.
#[derive(Debug, Entity, Default, Clone, PartialEq)]
#[entity(kind = "Part", created(enabled = true, indexed = true))]
pub struct Part {
    #[entity(meta)]
    pub meta: EntityMeta,
    #[entity(parent)]
    pub widget: Option<Key>,
    #[entity(rename = "part_no")]
    pub number: String,
    pub quantity: i64,
    #[entity(ignore)]
    pub scratch: String,
}

/// A record without timestamps, carrying its key in a plain field.
#[derive(Debug, Entity, Default, Clone, PartialEq)]
#[entity(kind = "Label")]
pub struct Label {
    #[entity(key)]
    pub key: Option<Key>,
    pub text: String,
}

/// Projection row for widgets.
#[derive(Debug, Entity, Default, Clone, PartialEq)]
#[entity(kind = "Widget")]
pub struct WidgetSize {
    pub name: String,
    pub size: i64,
}

pub fn generate_widget(size: i64) -> Widget {
    Widget {
        name: Name().fake(),
        size,
        weight: size as f64 * 0.5,
        tags: vec![["stock", "sale", "new"][rand::rng().random_range(0..3)].to_string()],
        description: Sentence(3..8).fake(),
        status: Status::Active,
        dimensions: Some(Dimensions {
            width: (1..50).fake::<i64>(),
            height: (1..50).fake::<i64>(),
            label: String::new(),
        }),
        ..Widget::default()
    }
}

pub fn generate_part(widget: &Key, quantity: i64) -> Part {
    Part {
        widget: Some(widget.clone()),
        number: format!("P-{}", (1000..9999).fake::<u32>()),
        quantity,
        ..Part::default()
    }
}
