use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use kvmap_mapper::{EntityProxy, MapperConfig, MappingContext, Proxy};
use kvmap_schema::TypeRegistry;
use kvmap_store::{JsonFileStore, KeyValueStore};
use serde_json::{json, Value};

use crate::cli::*;
use crate::model::{self, Address, Person};

struct Session {
    store: Arc<JsonFileStore>,
    ctx: MappingContext,
    format: OutputFormat,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = open_session(&cli)?;
    match cli.command {
        Command::Demo => cmd_demo(&session),
        Command::Show(args) => cmd_show(&session, &args.id),
        Command::Keys(args) => cmd_keys(&session, &args.prefix),
        Command::Get(args) => cmd_get(&session, &args.key),
        Command::Birthday(args) => cmd_birthday(&session, &args.id),
        Command::Tag(args) => cmd_tag(&session, &args.id, &args.tag),
        Command::Remove(args) => cmd_remove(&session, &args.id),
    }
}

fn open_session(cli: &Cli) -> anyhow::Result<Session> {
    let config = match &cli.config {
        Some(path) => MapperConfig::load(path)?,
        None => MapperConfig::default(),
    };
    let store = Arc::new(
        JsonFileStore::open(&cli.store)
            .with_context(|| format!("opening store {}", cli.store.display()))?,
    );
    let ctx = MappingContext::with_config(store.clone(), Arc::new(TypeRegistry::new()), config);
    Ok(Session {
        store,
        ctx,
        format: cli.format,
    })
}

fn cmd_demo(session: &Session) -> anyhow::Result<()> {
    let key = session.ctx.save(&model::sample())?;
    match session.format {
        OutputFormat::Json => println!("{}", json!({ "saved": key, "keys": session.store.scan_prefix("").len() })),
        OutputFormat::Text => {
            println!("{} Saved {}", "✓".green().bold(), key.yellow());
            println!("  Store: {}", session.store.path().display());
        }
    }
    Ok(())
}

fn cmd_show(session: &Session, id: &str) -> anyhow::Result<()> {
    let person = find_person(session, id)?.read_only();
    let view = person_view(&person)?;
    match session.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => {
            println!("{} {}", "Person".bold(), person.store_key().yellow());
            for (field, value) in view.as_object().into_iter().flatten() {
                println!("  {:<8} {}", format!("{field}:"), render(value));
            }
        }
    }
    Ok(())
}

fn cmd_keys(session: &Session, prefix: &str) -> anyhow::Result<()> {
    let entries = session.store.scan_prefix(prefix);
    match session.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No keys.");
            }
            for (key, value) in &entries {
                println!("{} = {}", key.cyan(), value);
            }
        }
    }
    Ok(())
}

fn cmd_get(session: &Session, key: &str) -> anyhow::Result<()> {
    let value = session.store.get(key)?;
    match session.format {
        OutputFormat::Json => println!("{}", json!({ "key": key, "value": value })),
        OutputFormat::Text => match value {
            Some(value) => println!("{value}"),
            None => println!("{} {} is not set", "!".yellow(), key.bold()),
        },
    }
    Ok(())
}

fn cmd_birthday(session: &Session, id: &str) -> anyhow::Result<()> {
    let person = find_person(session, id)?;
    let age = person.get::<u32>("Age")? + 1;
    person.set("Age", &age)?;
    match session.format {
        OutputFormat::Json => println!("{}", json!({ "person": id, "age": age })),
        OutputFormat::Text => println!("{} {} is now {}", "✓".green().bold(), person.store_key().yellow(), age),
    }
    Ok(())
}

fn cmd_tag(session: &Session, id: &str, tag: &str) -> anyhow::Result<()> {
    let person = find_person(session, id)?;
    let index = match person.get_list::<String>("Tags")? {
        Some(tags) => tags.push(&tag.to_string())?,
        None => {
            person.set("Tags", &vec![tag.to_string()])?;
            0
        }
    };
    match session.format {
        OutputFormat::Json => println!("{}", json!({ "person": id, "tag": tag, "index": index })),
        OutputFormat::Text => println!("{} Tagged {} with {} at [{}]", "✓".green().bold(), person.store_key().yellow(), tag.cyan(), index),
    }
    Ok(())
}

fn cmd_remove(session: &Session, id: &str) -> anyhow::Result<()> {
    let removed = session.ctx.remove::<Person>(id)?;
    match session.format {
        OutputFormat::Json => println!("{}", json!({ "person": id, "removed": removed })),
        OutputFormat::Text if removed == 0 => println!("Nothing stored for Person{id}."),
        OutputFormat::Text => println!("{} Removed {} keys", "✓".green().bold(), removed),
    }
    Ok(())
}

fn find_person(session: &Session, id: &str) -> anyhow::Result<EntityProxy<Person>> {
    match session.ctx.find::<Person>(id)? {
        Some(person) => Ok(person),
        None => bail!("no person stored under key {id}"),
    }
}

/// Read every property of a person through its proxy.
fn person_view(person: &EntityProxy<Person>) -> anyhow::Result<Value> {
    let address = match person.get_object::<Address>("Address")? {
        Some(address) => json!({
            "street": address.get_string("Street")?,
            "city": address.get_string("City")?,
        }),
        None => Value::Null,
    };
    let tags = match person.get_list::<String>("Tags")? {
        Some(tags) => (0..tags.len()?)
            .map(|i| tags.get_string(i))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let friend = match person.get_entity::<Person>("Friend")? {
        Some(friend) => json!({
            "id": friend.key_value(),
            "name": friend.get_string("Name")?,
        }),
        None => Value::Null,
    };
    Ok(json!({
        "id": person.key_value(),
        "name": person.get_string("Name")?,
        "age": person.get::<u32>("Age")?,
        "address": address,
        "tags": tags,
        "friend": friend,
    }))
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "-".dimmed().to_string(),
        Value::String(text) => text.clone(),
        Value::Object(fields) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{k}={}", render(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(dir: &tempfile::TempDir) -> Session {
        let store = Arc::new(JsonFileStore::open(dir.path().join("kv.json")).unwrap());
        let ctx = MappingContext::new(store.clone());
        Session {
            store,
            ctx,
            format: OutputFormat::Json,
        }
    }

    #[test]
    fn demo_graph_reads_back_through_proxies() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        cmd_demo(&session).unwrap();

        let person = find_person(&session, "1").unwrap();
        let view = person_view(&person).unwrap();
        assert_eq!(view["name"], "Blueve");
        assert_eq!(view["age"], 27);
        assert_eq!(view["address"]["city"], "Wellington");
        assert_eq!(view["tags"], json!(["admin"]));
        assert_eq!(view["friend"]["name"], "Rin");
    }

    #[test]
    fn birthday_and_tag_mutate_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        cmd_demo(&session).unwrap();
        cmd_birthday(&session, "1").unwrap();
        cmd_tag(&session, "1", "ops").unwrap();
        // Person 2 was saved with an empty tag list.
        cmd_tag(&session, "2", "new").unwrap();

        assert_eq!(session.store.get("Person1Age").unwrap().as_deref(), Some("28"));
        assert_eq!(session.store.get("Person1Tags1").unwrap().as_deref(), Some("ops"));
        assert_eq!(session.store.get("Person2Tags0").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn remove_clears_the_demo_graph() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir);
        cmd_demo(&session).unwrap();
        cmd_remove(&session, "1").unwrap();
        assert!(session.store.scan_prefix("").is_empty());
        assert!(find_person(&session, "1").is_err());
    }
}
