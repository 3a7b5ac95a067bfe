use std::sync::Arc;

use kv_record::{Error, FilterPredicate, MemoryStore, QueryBuilder, Record, Schema, Text};

#[derive(kv_record::RecordSchema)]
#[allow(dead_code)]
pub struct Player {
    pub name: String,
    pub level: i64,
    #[unindexed]
    pub bio: Text,
}

#[derive(kv_record::RecordSchema)]
#[record(kind = "Item")]
#[allow(dead_code)]
pub struct Weapon {
    pub name: String,
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let schema = Arc::new(Schema::registered());
    let store = MemoryStore::new().with_schema(schema.clone());

    let mut sword = Record::new("Item")?.with_schema(schema.clone());
    sword.set("name", "sword");

    let mut alice = Record::new("Player")?.with_schema(schema.clone());
    alice.set("name", "Alice");
    alice.set("level", 25);
    alice.set("bio", "Wandered in from the northern wastes.");
    alice.set("weapon", sword.key().clone());

    let mut bob = Record::preallocated("Player", &store)?.with_schema(schema);
    bob.set("name", "Bob");
    bob.set("level", 12);

    let mut batch = vec![sword, alice, bob];
    store.put_all(&mut batch)?;

    let query = QueryBuilder::new(&store);
    let veterans = query.filtered_list("Player", FilterPredicate::gte("level", 20), None, None)?;
    for player in veterans.iter() {
        println!("{}", player);
    }

    let count = query.and_count(
        "Player",
        (
            FilterPredicate::gt("level", 10),
            FilterPredicate::ne("name", "Carol"),
        ),
    )?;
    println!("players above level 10: {}", count);

    Ok(())
}
