use denorm::{AppConfig, AppError, Propagation, Record, RecordStore, Role, Runtime, Value};
use std::env;
use std::fs;
use std::path::PathBuf;

fn write_config(contents: &str) -> PathBuf {
    let dir = env::temp_dir().join("denorm").join(format!("runtime_test_{}", rand::random::<u64>()));
    fs::create_dir_all(&dir).expect("config dir");
    let path = dir.join("denorm.toml");
    fs::write(&path, contents.replace("{db_path}", &dir.join("db").display().to_string())).expect("write config");
    path
}

const LIBRARY: &str = r#"
[storage]
db_path = "{db_path}"
db_cache_size_mb = 8

[sync]
propagation = "eager"

[models.authors]
columns = ["name"]

[models.books]
columns = ["title", "author_name", "author_name_is_synced"]
belongs_to.author = { model = "authors" }

[models.loans]
columns = ["borrower", "book_title", "book_author_name"]
belongs_to.book = { model = "books" }

[mappings.books]
author = { name = "author_name" }

[expressions]
loans = ["book.title == book_title", "book.author.name == book_author_name"]
"#;

#[test]
fn runtime_wires_mappings_from_a_config_file() {
    let path = write_config(LIBRARY);
    let config = AppConfig::new(path.to_str().expect("utf8 path")).expect("config");
    assert_eq!(config.sync.propagation, Propagation::Eager);

    let runtime = Runtime::from_config(&config).expect("runtime");
    let schema = runtime.registry.schema().clone();
    let authors = schema.model_id("authors").unwrap();
    let books = schema.model_id("books").unwrap();
    let loans = schema.model_id("loans").unwrap();
    assert_eq!(runtime.registry.entries().len(), 3);
    assert_eq!(runtime.registry.refs(authors, Role::Dependee).len(), 2);
    assert!(runtime.registry.has_role(books, Role::Intermediary));

    let repo = &runtime.repository;
    let (author, loan) = repo
        .transaction(|store| {
            let mut author = Record::new(authors).with("name", "Le Guin");
            repo.insert(store, &mut author)?;
            let mut book = Record::new(books).with("title", "The Dispossessed").with("author_id", author.id());
            repo.insert(store, &mut book)?;
            let mut loan = Record::new(loans).with("borrower", "Shevek").with("book_id", book.id());
            repo.insert(store, &mut loan)?;
            Ok((author.id().unwrap(), loan.id().unwrap()))
        })
        .expect("insert");

    let stored = repo.find(loans, loan).expect("find").expect("loan");
    assert_eq!(stored.get("book_title"), &Value::from("The Dispossessed"));
    assert_eq!(stored.get("book_author_name"), &Value::from("Le Guin"));

    let outcome = repo
        .transaction(|store| {
            let mut author = store.find(authors, author)?.ok_or_else(|| AppError::NotFound("author".into()))?;
            author.set("name", "Ursula K. Le Guin");
            repo.update(store, &mut author)
        })
        .expect("rename");
    assert_eq!(outcome.writes(), 2, "books and loans are reached through different joins");

    let stored = repo.find(loans, loan).expect("find").expect("loan");
    assert_eq!(stored.get("book_author_name"), &Value::from("Ursula K. Le Guin"));
}

#[test]
fn invalid_mapping_fails_at_startup() {
    let broken = LIBRARY.replace("book.author.name == book_author_name", "book.writer.name == book_author_name");
    let path = write_config(&broken);
    let config = AppConfig::new(path.to_str().expect("utf8 path")).expect("config");
    match Runtime::from_config(&config) {
        Err(err @ AppError::InvalidAssociationOrAttribute { .. }) => {
            assert!(err.is_configuration());
            assert!(err.to_string().contains("writer"));
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("mapping through an unknown association must not compile"),
    }
}
