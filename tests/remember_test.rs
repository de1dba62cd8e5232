//! End-to-end memoization behaviour of `remember`: hits, nesting,
//! directives, failure unwind, and session isolation.

use std::sync::atomic::{AtomicUsize, Ordering};

use yggdrasil::{Fill, MemoryStore, Tag, Yggdrasil, YggdrasilError};

fn new_cache() -> Yggdrasil {
    Yggdrasil::builder()
        .store(MemoryStore::new())
        .build()
        .expect("store is configured")
}

#[test]
fn builder_requires_store() {
    let err = Yggdrasil::builder().build().unwrap_err();
    assert!(matches!(err, YggdrasilError::NoStore));
}

#[tokio::test]
async fn second_call_returns_memoized_value() {
    let cache = new_cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let session = cache.session();
        let value = session
            .remember("greeting", 0, &[], || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Fill::Value("A".to_string()))
            })
            .await
            .unwrap()
            .into_value();
        assert_eq!(value, "A");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A different fill for the same key never runs.
    let session = cache.session();
    let value = session
        .remember("greeting", 0, &[], || async {
            Ok(Fill::Value("B".to_string()))
        })
        .await
        .unwrap()
        .into_value();
    assert_eq!(value, "A");
}

#[tokio::test]
async fn nested_fills_compose_and_only_invalidated_parts_recompute() {
    let cache = new_cache();
    let outer_calls = AtomicUsize::new(0);
    let sub1_calls = AtomicUsize::new(0);
    let sub2_calls = AtomicUsize::new(0);

    let run = |suffix: &'static str| {
        let session = cache.session();
        let outer_calls = &outer_calls;
        let sub1_calls = &sub1_calls;
        let sub2_calls = &sub2_calls;
        async move {
            session
                .remember("sentence", 0, &[], || async {
                    outer_calls.fetch_add(1, Ordering::SeqCst);
                    let first = session
                        .remember("word:1", 0, &[Tag::plain("sub:1")], || async {
                            sub1_calls.fetch_add(1, Ordering::SeqCst);
                            Ok(Fill::Value(format!(" dear{suffix}")))
                        })
                        .await?
                        .into_value();
                    let second = session
                        .remember("word:2", 0, &[Tag::plain("sub:2")], || async {
                            sub2_calls.fetch_add(1, Ordering::SeqCst);
                            Ok(Fill::Value(" world!".to_string()))
                        })
                        .await?
                        .into_value();
                    Ok(Fill::Value(format!("hello{first}{second}")))
                })
                .await
                .map(|out| out.into_value())
        }
    };

    let sentence = run("").await.unwrap();
    assert_eq!(sentence, "hello dear world!");

    cache.clear_tags(["sub:1"]).await;

    let sentence = run(" oh so dear").await.unwrap();
    assert_eq!(sentence, "hello dear oh so dear world!");

    // Outer and the invalidated inner re-ran; the other inner was served
    // from the store without recomputing.
    assert_eq!(outer_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sub1_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sub2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bypass_directive_stores_nothing() {
    let cache = new_cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let session = cache.session();
        let value = session
            .remember("volatile", 0, &[], || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Fill::Bypass("fresh".to_string()))
            })
            .await
            .unwrap()
            .into_value();
        assert_eq!(value, "fresh");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reveal_directive_exposes_snapshot_on_fill_and_on_hit() {
    let cache = new_cache();

    let session = cache.session();
    let out = session
        .remember("revealed", 0, &[Tag::plain("sub")], || async {
            Ok(Fill::Reveal("payload".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(out.value(), "payload");
    let tags = out.tags().expect("snapshot revealed on fill");
    assert!(tags.contains_key("t:sub"));

    // A later hit hands back the snapshot too. The sentinel fill proves
    // the callback never ran.
    let session = cache.session();
    let out = session
        .remember("revealed", 0, &[], || async {
            Ok(Fill::Value("MUST NOT RUN".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(out.value(), "payload");
    let tags = out.tags().expect("snapshot revealed on hit");
    assert!(tags.contains_key("t:sub"));
}

#[tokio::test]
async fn outer_snapshot_is_superset_of_inner_even_on_inner_hit() {
    let cache = new_cache();

    // Cache the inner value in its own request first.
    let session = cache.session();
    session
        .remember("inner", 0, &[Tag::plain("sub")], || async {
            Ok(Fill::Value("cached".to_string()))
        })
        .await
        .unwrap();

    // A fresh request: the inner call is a store hit, yet its tags must
    // still flow into the enclosing snapshot.
    let session = cache.session();
    let out = session
        .remember("outer", 0, &[], || async {
            let inner = session
                .remember("inner", 0, &[], || async {
                    Ok(Fill::Value("MUST NOT RUN".to_string()))
                })
                .await?
                .into_value();
            Ok(Fill::Reveal(format!("outer({inner})")))
        })
        .await
        .unwrap();
    assert_eq!(out.value(), "outer(cached)");
    assert!(out.tags().expect("revealed").contains_key("t:sub"));
}

#[tokio::test]
async fn failed_inner_fill_unwinds_without_storing_ancestors() {
    let cache = new_cache();
    let first_calls = AtomicUsize::new(0);
    let outer_calls = AtomicUsize::new(0);

    let session = cache.session();
    let result = session
        .remember("outer", 0, &[], || async {
            outer_calls.fetch_add(1, Ordering::SeqCst);
            let first = session
                .remember("inner:ok", 0, &[], || async {
                    first_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Fill::Value("one".to_string()))
                })
                .await?
                .into_value();
            let second = session
                .remember::<String, _, _>("inner:boom", 0, &[], || async {
                    Err(YggdrasilError::callback("downstream exploded"))
                })
                .await?
                .into_value();
            Ok(Fill::Value(format!("{first}{second}")))
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, YggdrasilError::Callback(_)));
    assert!(err.to_string().contains("downstream exploded"));

    // The completed sibling kept its write; the failing frame and its
    // ancestor stored nothing.
    let session = cache.session();
    session
        .remember("inner:ok", 0, &[], || async {
            first_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill::Value("one".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);

    let session = cache.session();
    session
        .remember("outer", 0, &[], || async {
            outer_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill::Value("rebuilt".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(outer_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn independent_sessions_never_share_frames() {
    let cache = new_cache();
    let a = cache.session();
    let b = cache.session();

    // A heritable tag scoped inside session A must not leak into a value
    // cached through session B, even while A's frame is open.
    a.wrap(&[Tag::heritable("scoped")], || async {
        let out = b
            .remember("b:key", 0, &[], || async {
                Ok(Fill::Reveal("b-value".to_string()))
            })
            .await?;
        assert!(!out.tags().expect("revealed").contains_key("t:scoped"));
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn payload_shape_change_recomputes_instead_of_failing() {
    let cache = new_cache();
    let calls = AtomicUsize::new(0);

    let session = cache.session();
    session
        .remember("shape", 0, &[], || async {
            Ok(Fill::Value("text".to_string()))
        })
        .await
        .unwrap();

    // Same key read back as a different type: the stale payload decodes to
    // nothing, so the fill runs and overwrites it.
    let session = cache.session();
    let value = session
        .remember("shape", 0, &[], || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill::Value(42u32))
        })
        .await
        .unwrap()
        .into_value();
    assert_eq!(value, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let session = cache.session();
    let value = session
        .remember("shape", 0, &[], || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Fill::Value(0u32))
        })
        .await
        .unwrap()
        .into_value();
    assert_eq!(value, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
