mod common;

use bson::{Bson, doc};
use common::person_schema;
use nexuslite_repository::query::{
    CmpOp, CompiledQuery, Filter, MethodSignature, Operator, Param, ParamKind, Predicate, QuerySpecification,
    like_to_regex,
};
use nexuslite_repository::{DbError, params};
use ParamKind::{Sequence, Value};

fn bind(method: &str, kinds: &[ParamKind], args: &[Param]) -> Result<QuerySpecification, DbError> {
    let sig = MethodSignature::new(method, kinds.iter().copied()).for_entity("Person");
    CompiledQuery::compile(&sig, &person_schema())?.bind(args, 1000)
}

fn filter_doc(method: &str, kinds: &[ParamKind], args: &[Param]) -> bson::Document {
    bind(method, kinds, args).unwrap().filter().to_document()
}

#[test]
fn equality_and_range_render_as_store_documents() {
    assert_eq!(filter_doc("findByLastname", &[Value], &params!["Matthews"]), doc! { "lastname": "Matthews" });
    assert_eq!(filter_doc("findByAgeGreaterThan", &[Value], &params![30]), doc! { "age": { "$gt": 30 } });
    assert_eq!(filter_doc("findByAgeLessThanEqual", &[Value], &params![30]), doc! { "age": { "$lte": 30 } });
    assert_eq!(filter_doc("findByLastnameNot", &[Value], &params!["Keys"]), doc! { "lastname": { "$ne": "Keys" } });
}

#[test]
fn between_is_exclusive_on_both_ends() {
    assert_eq!(
        filter_doc("findByAgeBetween", &[Value, Value], &params![40, 45]),
        doc! { "age": { "$gt": 40, "$lt": 45 } }
    );
}

#[test]
fn and_groups_merge_and_or_groups_nest() {
    assert_eq!(
        filter_doc("findByFirstnameAndLastname", &[Value, Value], &params!["Dave", "Matthews"]),
        doc! { "firstname": "Dave", "lastname": "Matthews" }
    );
    assert_eq!(
        filter_doc("findByFirstnameOrLastname", &[Value, Value], &params!["Boyd", "Keys"]),
        doc! { "$or": [ { "firstname": "Boyd" }, { "lastname": "Keys" } ] }
    );
}

#[test]
fn predicate_tree_follows_source_order() {
    let spec = bind(
        "findByFirstnameAndLastnameOrAgeGreaterThan",
        &[Value, Value, Value],
        &params!["Dave", "Matthews", 45],
    )
    .unwrap();
    let Some(Predicate::Or(groups)) = spec.predicate() else { panic!("expected an OR") };
    assert!(matches!(&groups[0], Predicate::And(leaves) if leaves.len() == 2));
    assert!(matches!(&groups[1], Predicate::Leaf(c) if c.operator == Operator::GreaterThan));
    let criteria = spec.predicate().unwrap().criteria();
    let values: Vec<&Param> = criteria.iter().flat_map(|c| &c.values).collect();
    assert_eq!(values, vec![&Param::from("Dave"), &Param::from("Matthews"), &Param::from(45)]);
}

#[test]
fn pattern_operators_become_regexes() {
    let cases: [(&str, &str, &str); 5] = [
        ("findByFirstnameLike", "Da*", "^Da"),
        ("findByFirstnameStartingWith", "Ca", "^Ca"),
        ("findByFirstnameEndingWith", "ve", "ve$"),
        ("findByFirstnameContaining", "oy", "oy"),
        ("findByFirstnameRegex", "^B.*d$", "^B.*d$"),
    ];
    for (method, arg, pattern) in cases {
        let spec = bind(method, &[Value], &params![arg]).unwrap();
        assert_eq!(
            spec.filter(),
            &Filter::Regex { path: "firstname".into(), pattern: pattern.into(), case_insensitive: false },
            "{method}"
        );
    }
}

#[test]
fn pattern_arguments_are_escaped() {
    let spec = bind("findByEmailStartingWith", &[Value], &params!["dave.m+"]).unwrap();
    assert!(matches!(spec.filter(), Filter::Regex { pattern, .. } if pattern == r"^dave\.m\+"));
    assert_eq!(like_to_regex("*a.b*"), r"a\.b");
    assert_eq!(like_to_regex("a*b"), "^a.*b$");
}

#[test]
fn negated_patterns_wrap_in_not() {
    let spec = bind("findByFirstnameNotLike", &[Value], &params!["D*"]).unwrap();
    assert!(matches!(spec.filter(), Filter::Not(inner) if matches!(**inner, Filter::Regex { .. })));
    assert_eq!(spec.filter().to_document(), doc! { "$nor": [ { "firstname": { "$regex": "^D" } } ] });
}

#[test]
fn ignore_case_equality_is_anchored_regex() {
    let spec = bind("findByLastnameIgnoreCase", &[Value], &params!["matthews"]).unwrap();
    assert_eq!(
        spec.filter().to_document(),
        doc! { "lastname": { "$regex": "^matthews$", "$options": "i" } }
    );
}

#[test]
fn collection_containing_matches_elements() {
    let spec = bind("findBySkillsContaining", &[Value], &params!["vocals"]).unwrap();
    assert_eq!(spec.filter(), &Filter::Cmp { path: "skills".into(), op: CmpOp::Eq, value: "vocals".into() });
}

#[test]
fn in_takes_one_sequence_parameter() {
    let spec = bind("findByFirstnameIn", &[Sequence], &params![vec!["Dave", "Boyd"]]).unwrap();
    assert_eq!(spec.filter().to_document(), doc! { "firstname": { "$in": ["Dave", "Boyd"] } });
    let spec = bind("findByFirstnameNotIn", &[Sequence], &[Param::values(Vec::<String>::new())]).unwrap();
    assert_eq!(spec.filter(), &Filter::Nin { path: "firstname".into(), values: vec![] });
}

#[test]
fn in_set_size_is_bounded() {
    let sig = MethodSignature::new("findByAgeIn", [Sequence]).for_entity("Person");
    let q = CompiledQuery::compile(&sig, &person_schema()).unwrap();
    let err = q.bind(&params![vec![1, 2, 3]], 2).unwrap_err();
    assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
    assert!(q.bind(&params![vec![1, 2]], 2).is_ok());
}

#[test]
fn valueless_operators() {
    assert_eq!(filter_doc("findByEmailIsNull", &[], &[]), doc! { "email": Bson::Null });
    assert_eq!(filter_doc("findByEmailIsNotNull", &[], &[]), doc! { "email": { "$ne": Bson::Null } });
    assert_eq!(filter_doc("findByEmailExists", &[], &[]), doc! { "email": { "$exists": true } });
    assert_eq!(filter_doc("findByActiveTrue", &[], &[]), doc! { "active": true });
    assert_eq!(filter_doc("findByActiveFalse", &[], &[]), doc! { "active": false });
}

#[test]
fn value_types_are_checked_against_the_schema() {
    let err = bind("findByAgeGreaterThan", &[Value], &params!["old"]).unwrap_err();
    assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
    assert!(bind("findByActiveTrue", &[], &[]).is_ok());
    let err = bind("findByAgeBetween", &[Value, Value], &params![10, "x"]).unwrap_err();
    assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
}

#[test]
fn pattern_on_number_fails_at_compile_time() {
    let sig = MethodSignature::new("findByAgeLike", [Value]).for_entity("Person");
    let err = CompiledQuery::compile(&sig, &person_schema()).unwrap_err();
    assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
}

#[test]
fn invalid_regex_argument_is_rejected() {
    let err = bind("findByFirstnameRegex", &[Value], &params!["(unclosed"]).unwrap_err();
    assert!(matches!(err, DbError::ClauseTypeMismatch { .. }), "{err}");
}

#[test]
fn embedded_values_compare_whole_documents() {
    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Addr<'a> {
        street: &'a str,
        zip_code: &'a str,
        city: &'a str,
    }
    let arg = Param::serialize(&Addr { street: "Broadway", zip_code: "10001", city: "New York" }).unwrap();
    let spec = bind("findByAddress", &[Value], &[arg]).unwrap();
    assert_eq!(
        spec.filter().to_document(),
        doc! { "address": { "street": "Broadway", "zipCode": "10001", "city": "New York" } }
    );
}
