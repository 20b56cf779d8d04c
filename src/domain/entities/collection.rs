use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Secondary index over a top-level field of the records in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub key_path: &'static str,
    pub column: &'static str,
}

const MENU_ITEM_INDEXES: &[IndexSpec] = &[IndexSpec {
    name: "by_location",
    key_path: "location_id",
    column: "location_id",
}];

const ORDER_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "by_location",
        key_path: "location_id",
        column: "location_id",
    },
    IndexSpec {
        name: "by_status",
        key_path: "status",
        column: "status",
    },
];

const ORDER_ITEM_INDEXES: &[IndexSpec] = &[IndexSpec {
    name: "by_order",
    key_path: "order_id",
    column: "order_id",
}];

const QUEUE_INDEXES: &[IndexSpec] = &[IndexSpec {
    name: "by_table",
    key_path: "table",
    column: "target_table",
}];

/// Named collections of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    MenuItems,
    Orders,
    OrderItems,
    SyncQueue,
    DeadLetters,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::MenuItems,
        Collection::Orders,
        Collection::OrderItems,
        Collection::SyncQueue,
        Collection::DeadLetters,
    ];

    /// SQLite table backing the collection.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::MenuItems => "menu_items",
            Collection::Orders => "orders",
            Collection::OrderItems => "order_items",
            Collection::SyncQueue => "sync_queue",
            Collection::DeadLetters => "dead_letters",
        }
    }

    pub fn indexes(&self) -> &'static [IndexSpec] {
        match self {
            Collection::MenuItems => MENU_ITEM_INDEXES,
            Collection::Orders => ORDER_INDEXES,
            Collection::OrderItems => ORDER_ITEM_INDEXES,
            Collection::SyncQueue | Collection::DeadLetters => QUEUE_INDEXES,
        }
    }

    pub fn index(&self, name: &str) -> Option<&'static IndexSpec> {
        self.indexes().iter().find(|index| index.name == name)
    }

    /// Business collections are caches of server-side entities; the other two
    /// belong to the sync machinery.
    pub fn is_business(&self) -> bool {
        !matches!(self, Collection::SyncQueue | Collection::DeadLetters)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.table() == s)
            .ok_or_else(|| format!("Unknown collection: {s}"))
    }
}
