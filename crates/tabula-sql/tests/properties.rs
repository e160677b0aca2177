use proptest::prelude::*;
use serde_json::{Value, json};
use tabula_core::{Dialect, Property, PropertyKind, Schema, dialect::contains_pattern};
use tabula_sql::filter::{AND_KEY, BOOL_KEY, OR_KEY, SEARCH_KEY};
use tabula_sql::{Filter, FilterCompiler, Predicate, StatementBuilder, compile_filter, search_field};

fn schema() -> Schema {
    Schema::new("test", "tests")
        .with_property(Property::new("id", PropertyKind::String))
        .with_property(Property::new("name", PropertyKind::String).with_nullable(true))
        .with_property(Property::new("count", PropertyKind::Integer))
}

fn arb_dialect() -> impl Strategy<Value = Dialect> {
    prop_oneof![
        Just(Dialect::Postgres),
        Just(Dialect::Mysql),
        Just(Dialect::Sqlite),
    ]
}

fn arb_text_leaf() -> impl Strategy<Value = Predicate> {
    let field = prop_oneof![Just("id"), Just("name")];
    let text = "[a-z%_\\\\?$0-9]{0,6}";
    (field, text, 0..5u8, prop::collection::vec("[a-z?$]{0,4}", 0..4)).prop_map(
        |(field, text, shape, list)| match shape {
            0 => Predicate::eq(field, text),
            1 => Predicate::neq(field, text),
            2 => Predicate::search(field, text),
            3 => Predicate::eq(field, json!(list)),
            _ => Predicate::neq(field, json!(list)),
        },
    )
}

fn arb_int_leaf() -> impl Strategy<Value = Predicate> {
    (any::<i64>(), prop::collection::vec(any::<i64>(), 0..4), any::<bool>()).prop_map(
        |(n, list, single)| {
            if single {
                Predicate::eq("count", n)
            } else {
                Predicate::neq("count", json!(list))
            }
        },
    )
}

fn arb_predicate() -> impl Strategy<Value = Predicate> {
    let leaf = prop_oneof![
        arb_text_leaf(),
        arb_int_leaf(),
        any::<bool>().prop_map(Predicate::Const),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::And),
            prop::collection::vec(inner, 0..4).prop_map(Predicate::Or),
        ]
    })
}

/// A `(property, value)` pair as it appears in a raw filter map.
fn arb_condition() -> impl Strategy<Value = (String, Value)> {
    let text = prop_oneof![
        "[a-z%_\\\\?$0-9]{0,6}".prop_map(Value::from),
        prop::collection::vec("[a-z?$]{0,4}", 0..4).prop_map(|list| json!(list)),
        "[a-z%?]{0,4}".prop_map(|text: String| search_field(text)),
        Just(Value::Null),
    ];
    let int = prop_oneof![
        any::<i64>().prop_map(Value::from),
        prop::collection::vec(any::<i64>(), 0..4).prop_map(|list| json!(list)),
        "[0-9]{0,3}".prop_map(|text: String| search_field(text)),
    ];
    prop_oneof![
        (prop_oneof![Just("id"), Just("name")], text).prop_map(|(f, v)| (f.to_string(), v)),
        int.prop_map(|v| ("count".to_string(), v)),
    ]
}

fn compound(key: &str, entries: Vec<Value>) -> Value {
    let mut map = Filter::new();
    map.insert(key.to_string(), Value::Array(entries));
    Value::Object(map)
}

/// An entry of an `__and__` / `__or__` list: an explicit leaf, a bare map,
/// or a nested compound.
fn arb_entry() -> BoxedStrategy<Value> {
    let leaf = prop_oneof![
        (arb_condition(), any::<bool>()).prop_map(|((property, value), neq)| {
            let is_search = value.get(SEARCH_KEY).is_some();
            let op = if neq && !is_search { "neq" } else { "eq" };
            json!({"property": property, "type": op, "value": value})
        }),
        prop::collection::vec(arb_condition(), 1..3)
            .prop_map(|conditions| Value::Object(conditions.into_iter().collect())),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(|e| compound(AND_KEY, e)),
            prop::collection::vec(inner, 0..3).prop_map(|e| compound(OR_KEY, e)),
        ]
    })
    .boxed()
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    (
        prop::collection::vec(arb_condition(), 0..3),
        prop::option::of(prop::collection::vec(arb_entry(), 0..3)),
        prop::option::of(prop::collection::vec(arb_entry(), 0..3)),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(conditions, and, or, flag)| {
            let mut filter: Filter = conditions.into_iter().collect();
            if let Some(and) = and {
                filter.insert(AND_KEY.to_string(), Value::Array(and));
            }
            if let Some(or) = or {
                filter.insert(OR_KEY.to_string(), Value::Array(or));
            }
            if let Some(flag) = flag {
                filter.insert(BOOL_KEY.to_string(), Value::Bool(flag));
            }
            filter
        })
}

fn unescape_like(pattern: &str) -> String {
    let mut out = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

proptest! {
    #[test]
    fn placeholders_match_parameters(predicate in arb_predicate(), dialect in arb_dialect()) {
        let schema = schema();
        let mut builder = StatementBuilder::new(dialect);
        FilterCompiler::new(&schema, dialect)
            .render_root(&predicate, &mut builder)
            .unwrap();
        let (sql, params) = builder.finish();
        prop_assert_eq!(dialect.count_placeholders(&sql), params.len());
    }

    #[test]
    fn raw_filters_bind_every_placeholder(filter in arb_filter(), dialect in arb_dialect()) {
        let compiled = compile_filter(&schema(), &filter, dialect).unwrap();
        prop_assert_eq!(dialect.count_placeholders(&compiled.sql), compiled.params.len());
        prop_assert_eq!(compiled.sql.is_empty(), filter.is_empty());
    }

    #[test]
    fn compiled_sql_never_contains_literals(text in "[a-z]{8,12}", dialect in arb_dialect()) {
        let schema = schema();
        let predicate = Predicate::Or(vec![
            Predicate::eq("name", text.clone()),
            Predicate::search("id", text.clone()),
        ]);
        let mut builder = StatementBuilder::new(dialect);
        FilterCompiler::new(&schema, dialect)
            .render_root(&predicate, &mut builder)
            .unwrap();
        prop_assert!(!builder.sql().contains(&text));
    }

    #[test]
    fn like_pattern_round_trips(text in ".{0,16}") {
        let pattern = contains_pattern(&text);
        prop_assert!(pattern.starts_with('%') && pattern.ends_with('%'));
        let inner = &pattern[1..pattern.len() - 1];
        prop_assert_eq!(unescape_like(inner), text);

        // Every wildcard inside the pattern is escaped.
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            prop_assert!(c != '%' && c != '_');
            escaped = c == '\\';
        }
    }

    #[test]
    fn quoted_identifiers_round_trip(ident in "[a-z\"`]{1,10}", dialect in arb_dialect()) {
        let quoted = dialect.quote_ident(&ident);
        let q = dialect.quote_char();
        prop_assert!(quoted.starts_with(q) && quoted.ends_with(q));
        let inner = &quoted[1..quoted.len() - 1];
        let doubled: String = [q, q].iter().collect();
        prop_assert_eq!(inner.replace(&doubled, &q.to_string()), ident);
    }
}
