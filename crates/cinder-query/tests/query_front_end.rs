//! End to end tests of the query front end

use cinder_core::{Error, Section};
use cinder_query::{parse_query, parse_query_on_section, parse_query_with, Query, QueryOptions, Term, P};

#[test]
fn test_user_query_on_reported_section() {
    let options = QueryOptions::from_json(r#"{"section": "reported"}"#).unwrap();

    let query = parse_query_on_section(
        "is(instance) and cpu > 4 and /ancestors.account.reported.name == \"prod\" --> is(volume)",
        &options,
    )
    .unwrap();
    assert_eq!(
        query.to_string(),
        "((is(\"instance\") and reported.cpu > 4) and ancestors.account.reported.name == \"prod\") \
         -default-> is(\"volume\")"
    );

    let merged = parse_query_on_section(
        "cpu > 4 and /ancestors.region.reported.kind == \"region\"",
        &options,
    )
    .unwrap();
    assert_eq!(
        merged.to_string(),
        "reported.cpu > 4 {ancestors.region: all <-default[1:]- is(\"region\")} \
         ancestors.region.reported.kind == \"region\""
    );
    assert!(matches!(merged.current_part().term, Term::Merge(_)));
}

#[test]
fn test_invalid_edge_type_is_reported() {
    let err = parse_query("edge_type=network: is(instance) -->").unwrap_err();
    assert!(matches!(err, Error::InvalidEdgeType { .. }));
    assert!(err.to_string().contains("network"));

    let options = QueryOptions::default().allow_edge_type("network");
    let query = parse_query_with("edge_type=network: is(instance) -->", &options).unwrap();
    assert_eq!(query.to_string(), "is(\"instance\") -network->");
}

#[test]
fn test_parse_errors_carry_position() {
    match parse_query("is(instance) and (cpu > 4") {
        Err(Error::QueryParse { position, .. }) => assert_eq!(position, 25),
        other => panic!("Expected parse error, got {other:?}"),
    }
}

#[test]
fn test_builder_matches_parser() {
    let built = Query::by(P::of_kind("instance") & P::new("cpu").gt(4))
        .traverse_out()
        .filter("volume")
        .with_limit(10);
    let parsed = parse_query("is(instance) and cpu > 4 --> is(volume) limit 10").unwrap();
    assert_eq!(built, parsed);
}

#[test]
fn test_query_plan_json() {
    let query = parse_query("is(instance) and cpu > 4 sort name desc limit 5 <-[0:]- all")
        .unwrap()
        .on_section(Section::REPORTED)
        .unwrap();
    let json = serde_json::to_string(&query).unwrap();
    let restored: Query = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, query);
    assert_eq!(restored.relative_to_section(Section::REPORTED).on_section(Section::REPORTED).unwrap(), query);
}
