//! Command-line demo for Arbor.
//!
//! Runs canned operations against a small bookstore schema whose resolvers
//! answer synchronously, from spawned tasks and from plain threads.
//!
//! # Usage
//!
//! ```bash
//! # Resolve the whole catalog
//! arbor run catalog --pretty
//!
//! # Slow down every asynchronous resolver
//! arbor run lookup --delay-ms 200
//!
//! # Make one field fail to watch the error travel
//! arbor run catalog --fail Book.title
//!
//! # Execute with a configuration file
//! arbor run rate --config arbor.json
//!
//! # Print the schema
//! arbor schema
//! ```

use arbor_runtime::schema::{EnumDef, EnumValueDef, UnionDef};
use arbor_runtime::{
    AsyncUnit, ExecutionInput, Executor, ExecutorConfig, Field, FieldDef, FieldValue,
    FragmentDefinition, InlineFragment, InputFieldDef, InputValue, ObjectDef, Operation,
    ResolverError, ResolverMap, Response, Schema, SchemaBuilder, SelectionSet, TypeDef, TypeRef,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Canned operations against the bookstore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoOperation {
    /// Every book with its author and reviews
    Catalog,
    /// One book picked through a variable, plus the featured book
    Lookup,
    /// Books and authors matching a term
    Search,
    /// Two ratings applied one after the other
    Rate,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a demo operation and print the response
    Run {
        /// Operation to execute
        #[arg(value_enum, default_value = "catalog")]
        operation: DemoOperation,

        /// Make a field fail, given as `Type.field`
        #[arg(long, value_name = "FIELD")]
        fail: Vec<String>,

        /// Delay of asynchronous resolvers in milliseconds
        #[arg(long, default_value = "10")]
        delay_ms: u64,

        /// Executor configuration file (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Print the bookstore schema
    Schema,

    /// Show version information
    Version,
}

/// Runs the CLI. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            operation,
            fail,
            delay_ms,
            config,
            pretty,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => ExecutorConfig::default(),
            };
            let mut resolvers = bookstore_resolvers(Duration::from_millis(delay_ms));
            for field in &fail {
                fail_field(&mut resolvers, field)?;
            }
            if cli.verbose {
                eprintln!("{} {:?}", "Executing".blue(), operation);
            }

            let executor = Executor::new_with(config, resolvers);
            let response = executor
                .execute(&bookstore_schema(), demo_input(operation))
                .await?;
            print_response(&response, pretty)?;

            if response.has_errors() {
                if !cli.quiet {
                    eprintln!(
                        "{} {} error(s)",
                        "Completed with".yellow().bold(),
                        response.errors.as_ref().map_or(0, Vec::len)
                    );
                }
                Ok(2)
            } else {
                Ok(0)
            }
        }
        Commands::Schema => {
            print!("{}", describe_schema(&bookstore_schema()));
            Ok(0)
        }
        Commands::Version => {
            println!("arbor {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn load_config(path: &Path) -> Result<ExecutorConfig, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let config = ExecutorConfig::from_json(&source)?;
    tracing::debug!(?config, path = %path.display(), "loaded executor configuration");
    Ok(config)
}

fn print_response(response: &Response, pretty: bool) -> Result<(), serde_json::Error> {
    let output = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{output}");
    Ok(())
}

/// Replaces the resolver of `field` (`Type.field`) by one that always fails.
pub fn fail_field(resolvers: &mut ResolverMap, field: &str) -> Result<(), String> {
    let Some((type_name, field_name)) = field.split_once('.') else {
        return Err(format!("expected `Type.field`, got `{field}`"));
    };
    if type_name.is_empty() || field_name.is_empty() {
        return Err(format!("expected `Type.field`, got `{field}`"));
    }
    let message = format!("{field} failed on request");
    resolvers.register_fn(type_name, field_name, move |_| {
        Err(ResolverError::custom(message.clone()))
    });
    Ok(())
}

/// Builds the bookstore schema.
pub fn bookstore_schema() -> Arc<Schema> {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .object(
            ObjectDef::new("Query")
                .field(FieldDef::new(
                    "books",
                    TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("Book")))),
                ))
                .field(
                    FieldDef::new("book", TypeRef::named("Book")).argument(InputFieldDef::new(
                        "id",
                        TypeRef::non_null(TypeRef::named("ID")),
                    )),
                )
                .field(FieldDef::new("featured", TypeRef::named("Book")))
                .field(
                    FieldDef::new(
                        "search",
                        TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named(
                            "SearchResult",
                        )))),
                    )
                    .argument(InputFieldDef::new(
                        "term",
                        TypeRef::non_null(TypeRef::named("String")),
                    )),
                ),
        )
        .object(
            ObjectDef::new("Mutation").field(
                FieldDef::new("rate", TypeRef::named("Rating"))
                    .argument(InputFieldDef::new(
                        "bookId",
                        TypeRef::non_null(TypeRef::named("ID")),
                    ))
                    .argument(
                        InputFieldDef::new("stars", TypeRef::named("Int")).with_default(json!(3)),
                    ),
            ),
        )
        .object(
            ObjectDef::new("Book")
                .field(FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))))
                .field(FieldDef::new(
                    "title",
                    TypeRef::non_null(TypeRef::named("String")),
                ))
                .field(FieldDef::new("price", TypeRef::named("Float")))
                .field(FieldDef::new("genre", TypeRef::named("Genre")))
                .field(FieldDef::new("author", TypeRef::named("Author")))
                .field(FieldDef::new(
                    "reviews",
                    TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named(
                        "Review",
                    )))),
                )),
        )
        .object(
            ObjectDef::new("Author")
                .field(FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))))
                .field(FieldDef::new(
                    "name",
                    TypeRef::non_null(TypeRef::named("String")),
                )),
        )
        .object(
            ObjectDef::new("Review")
                .field(FieldDef::new("stars", TypeRef::non_null(TypeRef::named("Int"))))
                .field(FieldDef::new("body", TypeRef::named("String"))),
        )
        .object(
            ObjectDef::new("Rating")
                .field(FieldDef::new("bookId", TypeRef::non_null(TypeRef::named("ID"))))
                .field(FieldDef::new("stars", TypeRef::non_null(TypeRef::named("Int")))),
        )
        .add_type(TypeDef::Enum(EnumDef {
            name: "Genre".to_string(),
            description: None,
            values: ["SCIFI", "CLASSIC", "MYSTERY"]
                .into_iter()
                .map(|name| EnumValueDef {
                    name: name.to_string(),
                    description: None,
                    deprecated: false,
                    deprecation_reason: None,
                })
                .collect(),
        }))
        .add_type(TypeDef::Union(UnionDef {
            name: "SearchResult".to_string(),
            description: None,
            members: vec!["Book".to_string(), "Author".to_string()],
        }))
        .build();
    Arc::new(schema)
}

fn books() -> Vec<Value> {
    vec![
        json!({"id": "1", "title": "Dune", "price": 9.99, "genre": "SCIFI", "authorId": "a1"}),
        json!({"id": "2", "title": "Emma", "price": 5.5, "genre": "CLASSIC", "authorId": "a2"}),
        json!({"id": "3", "title": "The Hound of the Baskervilles", "price": null, "genre": "MYSTERY", "authorId": "a9"}),
    ]
}

fn authors() -> Vec<Value> {
    vec![
        json!({"id": "a1", "name": "Frank Herbert"}),
        json!({"id": "a2", "name": "Jane Austen"}),
    ]
}

fn reviews(book_id: &str) -> Value {
    match book_id {
        "1" => json!([
            {"stars": 5, "body": "A desert epic."},
            {"stars": 4, "body": null}
        ]),
        "2" => json!([{"stars": 4, "body": "Witty."}]),
        _ => json!([]),
    }
}

fn find_by_id(items: Vec<Value>, id: &str) -> Option<Value> {
    items.into_iter().find(|item| item["id"] == id)
}

/// Builds the bookstore resolvers. `delay` slows down every asynchronous
/// resolver.
pub fn bookstore_resolvers(delay: Duration) -> ResolverMap {
    let mut resolvers = ResolverMap::new();

    resolvers.register_fn("Query", "books", |_| Ok(Value::Array(books())));

    resolvers.register_async("Query", "book", move |env| async move {
        let id: String = env.require("id")?;
        tokio::time::sleep(delay).await;
        Ok(find_by_id(books(), &id).unwrap_or(Value::Null))
    });

    resolvers.register_unit_fn("Query", "featured", |_| {
        Ok(FieldValue::Unit(AsyncUnit::resolved(
            books().into_iter().next().unwrap_or(Value::Null),
        )))
    });

    resolvers.register_fn("Query", "search", |env| {
        let term: String = env.require("term")?;
        let term = term.to_lowercase();
        let matches = |value: &Value, key: &str| {
            value[key]
                .as_str()
                .is_some_and(|s| s.to_lowercase().contains(&term))
        };
        let found = books()
            .into_iter()
            .filter(|book| matches(book, "title"))
            .map(|book| tagged(book, "Book"))
            .chain(
                authors()
                    .into_iter()
                    .filter(|author| matches(author, "name"))
                    .map(|author| tagged(author, "Author")),
            )
            .collect();
        Ok(Value::Array(found))
    });

    // Answered from a plain thread through a completer.
    resolvers.register_unit_fn("Book", "author", move |env| {
        let author_id = env.source()["authorId"].as_str().map(str::to_string);
        let (completer, unit) = AsyncUnit::channel();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            let author = author_id.and_then(|id| find_by_id(authors(), &id));
            match author {
                Some(author) => completer.complete(author),
                None => completer.fail(ResolverError::custom("author record is missing")),
            }
        });
        Ok(FieldValue::Unit(unit))
    });

    resolvers.register_unit_fn("Book", "reviews", move |env| {
        let book_id = env.source()["id"].as_str().unwrap_or_default().to_string();
        Ok(FieldValue::Unit(AsyncUnit::spawn(async move {
            tokio::time::sleep(delay).await;
            Ok(reviews(&book_id))
        })))
    });

    resolvers.register_fn("Mutation", "rate", |env| {
        let book_id: String = env.require("bookId")?;
        let stars: i64 = env.require("stars")?;
        if !(1..=5).contains(&stars) {
            return Err(ResolverError::custom(format!(
                "stars must be between 1 and 5, got {stars}"
            )));
        }
        if find_by_id(books(), &book_id).is_none() {
            return Err(ResolverError::custom(format!("no book {book_id}")));
        }
        Ok(json!({"bookId": book_id, "stars": stars}))
    });

    resolvers
}

fn tagged(mut value: Value, type_name: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("__typename".to_string(), json!(type_name));
    }
    value
}

/// Builds the input of a demo operation.
pub fn demo_input(operation: DemoOperation) -> ExecutionInput {
    let author = || Field::new("author").select(SelectionSet::new().field(Field::new("name")));
    match operation {
        DemoOperation::Catalog => ExecutionInput::new(Operation::query(
            SelectionSet::new().field(
                Field::new("books").select(
                    SelectionSet::new()
                        .field(Field::new("id"))
                        .field(Field::new("title"))
                        .field(Field::new("price"))
                        .field(Field::new("genre"))
                        .field(author())
                        .field(
                            Field::new("reviews").select(
                                SelectionSet::new()
                                    .field(Field::new("stars"))
                                    .field(Field::new("body")),
                            ),
                        ),
                ),
            ),
        )),
        DemoOperation::Lookup => ExecutionInput::new(
            Operation::query(
                SelectionSet::new()
                    .field(
                        Field::new("book")
                            .arg("id", InputValue::variable("id"))
                            .select(SelectionSet::new().spread("BookCard")),
                    )
                    .field(
                        Field::new("featured")
                            .alias("pick")
                            .select(SelectionSet::new().spread("BookCard")),
                    ),
            )
            .named("Lookup"),
        )
        .fragment(FragmentDefinition::new(
            "BookCard",
            "Book",
            SelectionSet::new()
                .field(Field::new("title"))
                .field(author()),
        ))
        .variable("id", json!("2")),
        DemoOperation::Search => ExecutionInput::new(Operation::query(
            SelectionSet::new().field(
                Field::new("search")
                    .arg("term", InputValue::string("an"))
                    .select(
                        SelectionSet::new()
                            .field(Field::new("__typename"))
                            .inline(InlineFragment::on(
                                "Book",
                                SelectionSet::new().field(Field::new("title")),
                            ))
                            .inline(InlineFragment::on(
                                "Author",
                                SelectionSet::new().field(Field::new("name")),
                            )),
                    ),
            ),
        )),
        DemoOperation::Rate => {
            let rate = |alias: &str, book_id: &str, stars: i64| {
                Field::new("rate")
                    .alias(alias)
                    .arg("bookId", InputValue::string(book_id))
                    .arg("stars", InputValue::Int(stars))
                    .select(
                        SelectionSet::new()
                            .field(Field::new("bookId"))
                            .field(Field::new("stars")),
                    )
            };
            ExecutionInput::new(Operation::mutation(
                SelectionSet::new()
                    .field(rate("first", "1", 5))
                    .field(rate("second", "2", 9)),
            ))
        }
    }
}

/// Renders the schema in SDL-like notation.
pub fn describe_schema(schema: &Schema) -> String {
    let mut out = String::new();
    for (name, type_def) in schema.types() {
        match type_def {
            TypeDef::Scalar(_) => {}
            TypeDef::Object(object) => {
                out.push_str(&format!("type {name} {{\n"));
                for field in object.fields.values() {
                    out.push_str(&format!("  {}", field.name));
                    if !field.arguments.is_empty() {
                        let args: Vec<String> = field
                            .arguments
                            .values()
                            .map(|arg| format!("{}: {}", arg.name, arg.ty))
                            .collect();
                        out.push_str(&format!("({})", args.join(", ")));
                    }
                    out.push_str(&format!(": {}\n", field.ty));
                }
                out.push_str("}\n\n");
            }
            TypeDef::Union(union) => {
                out.push_str(&format!("union {name} = {}\n\n", union.members.join(" | ")));
            }
            TypeDef::Enum(enum_def) => {
                let values: Vec<&str> = enum_def.values.iter().map(|v| v.name.as_str()).collect();
                out.push_str(&format!("enum {name} {{ {} }}\n\n", values.join(" ")));
            }
            other => {
                out.push_str(&format!("{} {name}\n\n", other.kind()));
            }
        }
    }
    out
}
