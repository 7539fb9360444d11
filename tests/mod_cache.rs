mod common;

use common::{people_collection, person_repo, person_schema};
use nexuslite_repository::params;
use nexuslite_repository::query::{MethodSignature, ParamKind, QueryCache};
use std::sync::Arc;

fn sig(name: &str) -> MethodSignature {
    MethodSignature::new(name, [ParamKind::Value]).for_entity("Person")
}

#[test]
fn second_lookup_is_a_hit() {
    let cache = QueryCache::new(8);
    let a = cache.get_or_compile(&sig("findByLastname"), &person_schema()).unwrap();
    let b = cache.get_or_compile(&sig("findByLastname"), &person_schema()).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!((cache.hits(), cache.misses(), cache.len()), (1, 1, 1));
}

#[test]
fn changed_schema_recompiles() {
    let cache = QueryCache::new(8);
    cache.get_or_compile(&sig("findByLastname"), &person_schema()).unwrap();
    cache.get_or_compile(&sig("findByLastname"), &person_schema().string("nickname")).unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.hits(), 0);
}

#[test]
fn failures_are_not_cached() {
    let cache = QueryCache::new(8);
    assert!(cache.get_or_compile(&sig("findByNickname"), &person_schema()).is_err());
    assert!(cache.get_or_compile(&sig("findByNickname"), &person_schema()).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.misses(), 2);
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let cache = QueryCache::new(2);
    for name in ["findByLastname", "findByFirstname", "findByEmail"] {
        cache.get_or_compile(&sig(name), &person_schema()).unwrap();
    }
    assert_eq!(cache.len(), 2);
    cache.get_or_compile(&sig("findByEmail"), &person_schema()).unwrap();
    assert_eq!(cache.hits(), 1);
    cache.get_or_compile(&sig("findByLastname"), &person_schema()).unwrap();
    assert_eq!(cache.misses(), 4);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn repositories_share_a_cache() {
    let cache = Arc::new(QueryCache::new(8));
    let first = person_repo(people_collection()).with_cache(cache.clone());
    let second = person_repo(people_collection()).with_cache(cache.clone());
    first.register(MethodSignature::new("findByLastname", [ParamKind::Value])).unwrap();
    second.register(MethodSignature::new("findByLastname", [ParamKind::Value])).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.hits(), 1);
    assert_eq!(second.find("findByLastname", &params!["Keys"]).unwrap().len(), 1);
}

#[test]
fn concurrent_compiles_agree() {
    let cache = Arc::new(QueryCache::new(16));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                cache.get_or_compile(&sig("findByAgeGreaterThan"), &person_schema()).map(|c| c.shape())
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap().is_ok());
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.hits() + cache.misses(), 8);
}
