//! Sample schema used by the demo commands.

use std::sync::Arc;

use kvmap_schema::mapped_record;

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

pub struct Person {
    pub id: String,
    pub name: Option<String>,
    pub age: u32,
    pub address: Option<Address>,
    pub tags: Vec<String>,
    pub friend: Option<Arc<Person>>,
}

mapped_record! {
    Person as "Person" {
        #[key] id: String => "Id",
        name: Option<String> => "Name",
        age: u32 => "Age",
        address: Option<Address> => "Address",
        tags: Vec<String> => "Tags",
        friend: Option<Arc<Person>> => "Friend",
    }
}

/// Two people; the first references the second as a friend.
pub fn sample() -> Person {
    let friend = Person {
        id: "2".into(),
        name: Some("Rin".into()),
        age: 31,
        address: None,
        tags: Vec::new(),
        friend: None,
    };
    Person {
        id: "1".into(),
        name: Some("Blueve".into()),
        age: 27,
        address: Some(Address {
            street: "1 Harbour Rd".into(),
            city: Some("Wellington".into()),
        }),
        tags: vec!["admin".into()],
        friend: Some(Arc::new(friend)),
    }
}
