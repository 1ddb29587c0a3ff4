//! Models shared by the mapper test suites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use kvmap_schema::{mapped_record, CustomKey, Mapped, Record, RecordShape, Shape, Value};
use kvmap_store::{InMemoryStore, KeyValueStore, StoreError, StoreResult};

pub struct Person {
    pub id: String,
    pub name: Option<String>,
    pub age: i32,
}

mapped_record! {
    Person as "Person" {
        #[key] id: String => "Id",
        name: Option<String> => "Name",
        age: i32 => "Age",
    }
}

pub fn blueve() -> Person {
    Person {
        id: "1".into(),
        name: Some("Blueve".into()),
        age: 27,
    }
}

pub struct Address {
    pub street: String,
    pub city: Option<String>,
}

mapped_record! {
    Address as "Address" {
        street: String => "Street",
        city: Option<String> => "City",
    }
}

pub struct Member {
    pub handle: String,
    pub level: u8,
}

mapped_record! {
    Member as "Member" {
        #[key] handle: String => "Handle",
        level: u8 => "Level",
    }
}

pub fn member(handle: &str, level: u8) -> Member {
    Member {
        handle: handle.into(),
        level,
    }
}

pub struct Team {
    pub id: u32,
    pub name: String,
    pub office: Option<Address>,
    pub lead: Option<Arc<Member>>,
    pub members: Vec<Member>,
    pub scores: Vec<i64>,
    pub tags: Vec<String>,
}

mapped_record! {
    Team as "Team" {
        #[key] id: u32 => "Id",
        name: String => "Name",
        office: Option<Address> => "Office",
        lead: Option<Arc<Member>> => "Lead",
        members: Vec<Member> => "Members",
        scores: Vec<i64> => "Scores",
        tags: Vec<String> => "Tags",
    }
}

pub fn team() -> Team {
    Team {
        id: 7,
        name: "Core".into(),
        office: Some(Address {
            street: "Main St".into(),
            city: None,
        }),
        lead: Some(Arc::new(member("ann", 3))),
        members: vec![member("ann", 3), member("bob", 1)],
        scores: vec![10, 20],
        tags: vec!["infra".into()],
    }
}

/// Entity that can point at another entity, closing a cycle through `Arc`.
pub struct Node {
    pub id: String,
    pub peer: OnceLock<Arc<Node>>,
}

mapped_record! {
    Node as "Node" {
        #[key] id: String => "Id",
        peer: OnceLock<Arc<Node>> => "Peer",
    }
}

/// Identity-less object that can point back at itself.
pub struct Link {
    pub label: String,
    pub next: OnceLock<Arc<Link>>,
}

mapped_record! {
    Link as "Link" {
        label: String => "Label",
        next: OnceLock<Arc<Link>> => "Next",
    }
}

pub struct Chain {
    pub id: String,
    pub head: Option<Arc<Link>>,
}

mapped_record! {
    Chain as "Chain" {
        #[key] id: String => "Id",
        head: Option<Arc<Link>> => "Head",
    }
}

/// Build `a -> b -> a`.
pub fn node_cycle() -> (Arc<Node>, Arc<Node>) {
    let a = Arc::new(Node {
        id: "a".into(),
        peer: OnceLock::new(),
    });
    let b = Arc::new(Node {
        id: "b".into(),
        peer: OnceLock::new(),
    });
    let _ = a.peer.set(b.clone());
    let _ = b.peer.set(a.clone());
    (a, b)
}

/// A chain whose head link points at itself.
pub fn looped_chain() -> Chain {
    let link = Arc::new(Link {
        label: "loop".into(),
        next: OnceLock::new(),
    });
    let _ = link.next.set(link.clone());
    Chain {
        id: "c".into(),
        head: Some(link),
    }
}

pub struct Tag {
    pub line: String,
}

mapped_record! {
    Tag as "Tag" {
        line: String => "Line",
    }
}

/// `"Badge1" + "Tag" + "Line"` and `"Badge1" + "TagLine"` name the same key.
pub struct Badge {
    pub id: String,
    pub tag: Option<Tag>,
    pub tag_line: Option<String>,
}

mapped_record! {
    Badge as "Badge" {
        #[key] id: String => "Id",
        tag: Option<Tag> => "Tag",
        tag_line: Option<String> => "TagLine",
    }
}

pub struct ShelfKey {
    pub aisle: String,
    pub slot: u16,
}

impl Mapped for ShelfKey {
    fn shape() -> Shape {
        RecordShape::new("ShelfKey")
            .field::<String>("Aisle")
            .field::<u16>("Slot")
            .into()
    }

    fn value(&self) -> Value<'_> {
        Value::Record(self)
    }
}

impl Record for ShelfKey {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "Aisle" => self.aisle.value(),
            "Slot" => self.slot.value(),
            _ => Value::Null,
        }
    }

    fn key_capability(&self) -> Option<&dyn CustomKey> {
        Some(self)
    }
}

impl CustomKey for ShelfKey {
    fn custom_key(&self) -> String {
        format!("{}.{}", self.aisle, self.slot)
    }
}

/// Entity keyed by a composite object.
pub struct Shelf {
    pub key: ShelfKey,
    pub label: String,
}

mapped_record! {
    Shelf as "Shelf" {
        #[key] key: ShelfKey => "Key",
        label: String => "Label",
    }
}

pub struct Route {
    pub id: String,
    pub stops: Vec<Address>,
    pub legs: Vec<Vec<i64>>,
    pub grid: [u8; 3],
}

mapped_record! {
    Route as "Route" {
        #[key] id: String => "Id",
        stops: Vec<Address> => "Stops",
        legs: Vec<Vec<i64>> => "Legs",
        grid: [u8; 3] => "Grid",
    }
}

pub fn route() -> Route {
    Route {
        id: "r1".into(),
        stops: vec![
            Address {
                street: "Quay".into(),
                city: Some("Bergen".into()),
            },
            Address {
                street: "Dock".into(),
                city: None,
            },
        ],
        legs: vec![vec![5, 8], vec![]],
        grid: [1, 2, 3],
    }
}

/// Accepts a fixed number of writes, then fails every later one.
pub struct FailingStore {
    pub inner: InMemoryStore,
    writes_left: AtomicUsize,
}

impl FailingStore {
    pub fn new(writes: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            writes_left: AtomicUsize::new(writes),
        }
    }

    pub fn allow_writes(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }
}

impl KeyValueStore for FailingStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key)
    }

    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.try_acquire(key, token, ttl)
    }

    fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.inner.release(key, token)
    }
}
