use super::*;

//-----------------------------------------------------------------------------

fn create_connection() -> Connection {
    let connection = Connection::open_in_memory();
    assert!(connection.is_ok(), "Failed to open an in-memory database: {}", connection.unwrap_err());
    let connection = connection.unwrap();
    let result = connection.execute_batch(
        "CREATE TABLE MetaData (
            grp TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (grp, key)
        ) STRICT"
    );
    assert!(result.is_ok(), "Failed to create table MetaData: {}", result.unwrap_err());
    connection
}

fn load_group(connection: &Connection, group: &str) -> MetaData {
    let metadata = MetaData::load(connection, group);
    assert!(metadata.is_ok(), "Failed to load group {}: {}", group, metadata.unwrap_err());
    metadata.unwrap()
}

fn write_group(connection: &Connection, metadata: &mut MetaData) {
    let result = metadata.write(connection);
    assert!(result.is_ok(), "Failed to write group {}: {}", metadata.group(), result.unwrap_err());
    assert!(!metadata.is_dirty(), "Group {} is still dirty after writing", metadata.group());
}

fn group_exists(connection: &Connection, group: &str) -> bool {
    let result = MetaData::group_exists(connection, group);
    assert!(result.is_ok(), "Failed to check group {}: {}", group, result.unwrap_err());
    result.unwrap()
}

//-----------------------------------------------------------------------------

#[test]
fn empty_group() {
    let connection = create_connection();
    let metadata = load_group(&connection, "Meta");
    assert_eq!(metadata.group(), "Meta", "Wrong group name");
    assert!(metadata.is_empty(), "Missing group is not empty");
    assert_eq!(metadata.len(), 0, "Wrong number of keys");
    assert!(!metadata.is_dirty(), "Loaded group is dirty");
    assert!(!group_exists(&connection, "Meta"), "Empty group exists in the database");
}

#[test]
fn set_get_remove() {
    let mut metadata = MetaData::new("Meta");
    metadata.set("species", "human");
    metadata.set("assembly", "hg19");
    metadata.set("assembly", "hg38");
    assert!(metadata.is_dirty(), "Modified group is not dirty");
    assert_eq!(metadata.len(), 2, "Wrong number of keys");
    assert_eq!(metadata.get("assembly"), Some("hg38"), "Wrong value after overwriting");
    assert!(metadata.has("species"), "Missing key species");
    assert!(!metadata.has("missing"), "Found a missing key");
    assert_eq!(metadata.get("missing"), None, "Got a value for a missing key");

    let keys: Vec<(&str, &str)> = metadata.iter().collect();
    assert_eq!(keys, vec![("assembly", "hg38"), ("species", "human")], "Wrong key-value pairs");

    assert_eq!(metadata.remove("species"), Some(String::from("human")), "Wrong removed value");
    assert_eq!(metadata.remove("species"), None, "Removed a key twice");
    assert_eq!(metadata.len(), 1, "Wrong number of keys after removal");
}

#[test]
fn write_and_load() {
    let connection = create_connection();
    let mut metadata = MetaData::new("Genomes/human/Meta");
    metadata.set("assembly", "hg38");
    metadata.set("note", "it's 'quoted'");
    write_group(&connection, &mut metadata);
    assert!(group_exists(&connection, "Genomes/human/Meta"), "Written group does not exist");

    let loaded = load_group(&connection, "Genomes/human/Meta");
    assert_eq!(loaded, metadata, "Wrong group after loading");

    // Other groups are not affected.
    let other = load_group(&connection, "Meta");
    assert!(other.is_empty(), "Another group has keys");
}

#[test]
fn write_replaces_group() {
    let connection = create_connection();
    let mut metadata = MetaData::new("Meta");
    metadata.set("a", "1");
    metadata.set("b", "2");
    write_group(&connection, &mut metadata);

    metadata.remove("a");
    metadata.set("c", "3");
    write_group(&connection, &mut metadata);

    let loaded = load_group(&connection, "Meta");
    let pairs: Vec<(&str, &str)> = loaded.iter().collect();
    assert_eq!(pairs, vec![("b", "2"), ("c", "3")], "Stale keys after rewriting the group");
}

#[test]
fn clean_group_is_not_written() {
    let connection = create_connection();
    let metadata = MetaData::new("Meta");
    let result = metadata.store(&connection);
    assert!(result.is_ok(), "Failed to store a clean group: {}", result.unwrap_err());
    assert!(!group_exists(&connection, "Meta"), "Clean group was written");
}

#[test]
fn delete_group() {
    let connection = create_connection();
    let mut first = MetaData::new("Genomes/A/Meta");
    first.set("key", "value");
    write_group(&connection, &mut first);
    let mut second = MetaData::new("Genomes/B/Meta");
    second.set("key", "value");
    write_group(&connection, &mut second);

    let result = MetaData::delete_group(&connection, "Genomes/A/Meta");
    assert!(result.is_ok(), "Failed to delete a group: {}", result.unwrap_err());
    assert!(!group_exists(&connection, "Genomes/A/Meta"), "Deleted group still exists");
    assert!(group_exists(&connection, "Genomes/B/Meta"), "Deleted the wrong group");
}

//-----------------------------------------------------------------------------
