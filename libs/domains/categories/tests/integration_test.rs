//! Integration tests for the Categories domain
//!
//! These run against real PostgreSQL via testcontainers to check that:
//! - The schema constraints back up the service rules
//! - Guarded batch writes are atomic and detect concurrent changes
//! - Whole-tree operations produce the same results as the in-memory store

use chrono::Utc;
use domain_categories::repository::{
    CategoryChanges, CategoryQuery, CategoryWrite, HierarchySnapshot, NewCategory,
};
use domain_categories::tree::Placement;
use domain_categories::*;
use test_utils::{TestDataBuilder, TestDatabase, assertions::*};

fn new_category(name: &str, parent: Option<&Category>) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        description: None,
        icon: None,
        image: None,
        parent_id: parent.map(|p| p.id),
        level: parent.map_or(1, |p| p.level + 1),
        path: parent.map(Category::child_path).unwrap_or_default(),
        sort: 0,
        show_in_nav: true,
        status: CategoryStatus::Enabled,
        parent_snapshot: parent.map(HierarchySnapshot::from),
    }
}

/// Every row's level and path agree with its parent's.
async fn assert_hierarchy_consistent(repo: &PgCategoryRepository) {
    let all = repo.find(CategoryQuery::new()).await.unwrap();
    for category in &all {
        match category.parent_id {
            None => {
                assert_eq!(category.level, 1, "{} should be level 1", category.name);
                assert_eq!(category.path, "", "{} should have an empty path", category.name);
            }
            Some(parent_id) => {
                let parent = assert_some(
                    all.iter().find(|c| c.id == parent_id),
                    "parent should exist",
                );
                assert_eq!(category.level, parent.level + 1, "level of {}", category.name);
                assert_eq!(category.path, parent.child_path(), "path of {}", category.name);
            }
        }
    }
}

fn create(name: &str, parent_id: Option<i64>) -> CreateCategory {
    CreateCategory {
        name: name.to_string(),
        parent_id,
        ..Default::default()
    }
}

// ============================================================================
// Repository Tests
// ============================================================================

#[tokio::test]
async fn test_insert_and_get_category() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("insert_and_get");

    let before = Utc::now();
    let root = repo
        .insert(new_category(&builder.name("category", "root"), None))
        .await
        .unwrap();

    assert!(root.id > 0);
    assert_eq!(root.level, 1);
    assert_path(&root.path, &[], "root");
    assert_eq!(root.product_count, 0);
    assert!(root.created_at >= before - chrono::Duration::seconds(5));

    let fetched = assert_some(repo.get_by_id(root.id).await.unwrap(), "root should exist");
    assert_eq!(fetched.name, root.name);
    assert_eq!(fetched.status, CategoryStatus::Enabled);

    assert!(repo.get_by_id(root.id + 1000).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unique_index_covers_top_level_siblings() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let first = repo.insert(new_category("Books", None)).await.unwrap();
    let duplicate = repo.insert(new_category("Books", None)).await;
    assert!(
        matches!(duplicate, Err(CategoryError::DuplicateName(ref name)) if name == "Books"),
        "Expected DuplicateName, got {:?}",
        duplicate
    );

    // Same name under a different parent is allowed
    let child = repo
        .insert(new_category("Books", Some(&first)))
        .await
        .unwrap();
    assert_eq!(child.parent_id, Some(first.id));
}

#[tokio::test]
async fn test_insert_with_unknown_parent_hits_foreign_key() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let mut orphan = new_category("Orphan", None);
    orphan.parent_id = Some(4242);
    orphan.level = 2;
    orphan.path = "4242".to_string();

    let result = repo.insert(orphan).await;
    assert!(
        matches!(result, Err(CategoryError::ParentNotFound(4242))),
        "Expected ParentNotFound, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_foreign_key_restricts_deleting_parents() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let parent = repo.insert(new_category("Parent", None)).await.unwrap();
    let child = repo
        .insert(new_category("Child", Some(&parent)))
        .await
        .unwrap();

    let result = repo.delete(parent.id).await;
    assert!(
        matches!(result, Err(CategoryError::HasChildren(id)) if id == parent.id),
        "Expected HasChildren, got {:?}",
        result
    );

    assert!(repo.delete(child.id).await.unwrap());
    assert!(repo.delete(parent.id).await.unwrap());
    assert!(!repo.delete(parent.id).await.unwrap());
}

#[tokio::test]
async fn test_guarded_write_detects_concurrent_move() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let a = repo.insert(new_category("A", None)).await.unwrap();
    let b = repo.insert(new_category("B", None)).await.unwrap();
    let c = repo.insert(new_category("C", Some(&a))).await.unwrap();

    // Someone else moves C under B after we read it
    let stale = c.clone();
    let moved = repo
        .update_fields(vec![CategoryWrite {
            id: c.id,
            changes: CategoryChanges {
                parent_id: Some(Some(b.id)),
                path: Some(b.child_path()),
                ..Default::default()
            },
            expected: Some(HierarchySnapshot::from(&c)),
            expected_children: None,
        }])
        .await
        .unwrap();
    assert_eq!(moved, 1);

    let result = repo
        .update_fields(vec![CategoryWrite::guarded(
            &stale,
            CategoryChanges::status(CategoryStatus::Disabled),
        )])
        .await;
    assert!(
        matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == c.id),
        "Expected ConcurrentModification, got {:?}",
        result
    );

    let current = repo.get_by_id(c.id).await.unwrap().unwrap();
    assert_eq!(current.parent_id, Some(b.id));
    assert_eq!(current.status, CategoryStatus::Enabled);
}

#[tokio::test]
async fn test_restamp_planned_before_child_insert_is_rejected() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let p = repo.insert(new_category("P", None)).await.unwrap();
    let d = repo.insert(new_category("D", Some(&p))).await.unwrap();
    let x = repo.insert(new_category("X", None)).await.unwrap();

    // Move of P under X planned while D had no children
    let p_to = Placement::under(&x);
    let plan = vec![
        CategoryWrite::check(&x),
        CategoryWrite::guarded(&p, CategoryChanges::placement(&p_to)).with_children(1),
        CategoryWrite::guarded(
            &d,
            CategoryChanges {
                level: Some(3),
                path: Some(format!("{},{}", x.id, p.id)),
                ..Default::default()
            },
        )
        .with_children(0),
    ];

    // Another instance inserts below D before the move is applied
    repo.insert(new_category("Late", Some(&d))).await.unwrap();

    let result = repo.update_fields(plan).await;
    assert!(
        matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == d.id),
        "Expected ConcurrentModification, got {:?}",
        result
    );

    let p = repo.get_by_id(p.id).await.unwrap().unwrap();
    assert!(p.parent_id.is_none());
    assert_hierarchy_consistent(&repo).await;
}

#[tokio::test]
async fn test_insert_under_moved_parent_is_rejected() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let p = repo.insert(new_category("P", None)).await.unwrap();
    let d = repo.insert(new_category("D", Some(&p))).await.unwrap();
    let x = repo.insert(new_category("X", None)).await.unwrap();

    // Placement computed from D before another instance moves P under X
    let stale_child = new_category("Late", Some(&d));
    repo.update_fields(vec![
        CategoryWrite::guarded(&p, CategoryChanges::placement(&Placement::under(&x))),
        CategoryWrite::guarded(
            &d,
            CategoryChanges {
                level: Some(3),
                path: Some(format!("{},{}", x.id, p.id)),
                ..Default::default()
            },
        ),
    ])
    .await
    .unwrap();

    let result = repo.insert(stale_child).await;
    assert!(
        matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == d.id),
        "Expected ConcurrentModification, got {:?}",
        result
    );
    assert_eq!(repo.count(CategoryQuery::children_of(d.id)).await.unwrap(), 0);
    assert_hierarchy_consistent(&repo).await;
}

#[tokio::test]
async fn test_failed_batch_rolls_back_earlier_writes() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let a = repo.insert(new_category("A", None)).await.unwrap();
    let b = repo.insert(new_category("B", None)).await.unwrap();

    let result = repo
        .update_fields(vec![
            CategoryWrite::guarded(&a, CategoryChanges::show_in_nav(false)),
            CategoryWrite::guarded(&b, CategoryChanges::show_in_nav(false)),
            CategoryWrite {
                id: b.id + 1000,
                changes: CategoryChanges::show_in_nav(false),
                expected: None,
                expected_children: None,
            },
        ])
        .await;
    assert!(matches!(result, Err(CategoryError::NotFound(_))));

    for id in [a.id, b.id] {
        let category = repo.get_by_id(id).await.unwrap().unwrap();
        assert!(category.show_in_nav, "category {} should be unchanged", id);
    }
}

#[tokio::test]
async fn test_rename_into_taken_name_rolls_back() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let a = repo.insert(new_category("A", None)).await.unwrap();
    let b = repo.insert(new_category("B", None)).await.unwrap();

    let result = repo
        .update_fields(vec![
            CategoryWrite::guarded(&a, CategoryChanges::status(CategoryStatus::Disabled)),
            CategoryWrite::guarded(
                &b,
                CategoryChanges {
                    name: Some("A".to_string()),
                    ..Default::default()
                },
            ),
        ])
        .await;
    assert!(matches!(result, Err(CategoryError::DuplicateName(ref name)) if name == "A"));

    let a = repo.get_by_id(a.id).await.unwrap().unwrap();
    assert_eq!(a.status, CategoryStatus::Enabled);
}

#[tokio::test]
async fn test_check_constraint_rejects_level_past_depth_cap() {
    let db = TestDatabase::new().await;
    let repo = PgCategoryRepository::new(db.connection());

    let mut too_deep = new_category("Too deep", None);
    too_deep.level = MAX_DEPTH + 1;

    assert!(matches!(
        repo.insert(too_deep).await,
        Err(CategoryError::Internal(_))
    ));
}

// ============================================================================
// Service Tests
// ============================================================================

#[tokio::test]
async fn test_service_builds_and_moves_subtree() {
    let db = TestDatabase::new().await;
    let service = CategoryService::new(PgCategoryRepository::new(db.connection()));

    let a = service.create_category(create("A", None)).await.unwrap();
    let b = service.create_category(create("B", Some(a.id))).await.unwrap();
    let c = service.create_category(create("C", Some(b.id))).await.unwrap();
    let x = service.create_category(create("X", None)).await.unwrap();

    assert_path(&c.path, &[a.id, b.id], "C before move");
    assert_eq!(c.level, 3);

    let moved = service
        .move_category(
            b.id,
            MoveCategory {
                new_parent_id: Some(Some(x.id)),
                new_sort: Some(7),
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.parent_id, Some(x.id));
    assert_eq!(moved.sort, 7);
    assert_path(&moved.path, &[x.id], "B after move");

    let c = service.get_category(c.id).await.unwrap();
    assert_eq!(c.level, 3);
    assert_path(&c.path, &[x.id, b.id], "C after move");

    let circular = service
        .move_category(
            x.id,
            MoveCategory {
                new_parent_id: Some(Some(c.id)),
                new_sort: None,
            },
        )
        .await;
    assert!(matches!(circular, Err(CategoryError::CircularReference { .. })));

    let top = service
        .move_category(
            b.id,
            MoveCategory {
                new_parent_id: Some(None),
                new_sort: None,
            },
        )
        .await
        .unwrap();
    assert!(top.parent_id.is_none());
    assert_path(&top.path, &[], "B at top level");
    assert_eq!(service.get_category(c.id).await.unwrap().level, 2);
}

#[tokio::test]
async fn test_service_status_cascade_persists() {
    let db = TestDatabase::new().await;
    let service = CategoryService::new(PgCategoryRepository::new(db.connection()));

    let a = service.create_category(create("A", None)).await.unwrap();
    let b = service.create_category(create("B", Some(a.id))).await.unwrap();
    let c = service.create_category(create("C", Some(b.id))).await.unwrap();
    let z = service.create_category(create("Z", None)).await.unwrap();

    service
        .update_status(a.id, CategoryStatus::Disabled)
        .await
        .unwrap();
    for id in [a.id, b.id, c.id] {
        assert_eq!(
            service.get_category(id).await.unwrap().status,
            CategoryStatus::Disabled
        );
    }
    assert_eq!(
        service.get_category(z.id).await.unwrap().status,
        CategoryStatus::Enabled
    );

    let result = service
        .batch_update_show_in_nav(vec![b.id, z.id, b.id], false)
        .await
        .unwrap();
    assert_eq!(result.updated, 3);
    assert!(service.get_category(a.id).await.unwrap().show_in_nav);
    assert!(!service.get_category(c.id).await.unwrap().show_in_nav);
}

#[tokio::test]
async fn test_service_tree_and_listing() {
    let db = TestDatabase::new().await;
    let service = CategoryService::new(PgCategoryRepository::new(db.connection()));

    let a = service.create_category(create("Alpha", None)).await.unwrap();
    let b = service.create_category(create("Beta", Some(a.id))).await.unwrap();
    service.create_category(create("Gamma", Some(b.id))).await.unwrap();
    service.create_category(create("Delta", None)).await.unwrap();

    let forest = service
        .get_tree(TreeFilter {
            max_level: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(forest.len(), 2);
    let alpha = forest
        .iter()
        .find(|node| node.category.id == a.id)
        .expect("Alpha should be a root");
    assert_eq!(alpha.children.len(), 1);
    assert!(alpha.children[0].children.is_empty());

    let page = service
        .list_categories(CategoryFilter {
            name: Some("ta".to_string()),
            page_size: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 2); // Beta, Delta
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.page_data.len(), 1);

    let descendants = service.get_all_children(a.id).await.unwrap();
    assert_eq!(descendants.len(), 2);
}

#[tokio::test]
async fn test_unique_index_guards_separate_service_instances() {
    let db = TestDatabase::new().await;
    // Two instances do not share the in-process lock, as with two replicas
    let first = CategoryService::new(PgCategoryRepository::new(db.connection()));
    let second = CategoryService::new(PgCategoryRepository::new(db.connection()));

    let (left, right) = tokio::join!(
        first.create_category(create("Shared", None)),
        second.create_category(create("Shared", None)),
    );

    let successes = [left.is_ok(), right.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);

    let failure = if left.is_err() { left } else { right };
    assert!(matches!(failure, Err(CategoryError::DuplicateName(_))));
}

#[tokio::test]
async fn test_move_racing_child_create_keeps_paths_consistent() {
    let db = TestDatabase::new().await;
    let mover = CategoryService::new(PgCategoryRepository::new(db.connection()));
    let creator = CategoryService::new(PgCategoryRepository::new(db.connection()));
    let repo = PgCategoryRepository::new(db.connection());

    let p = mover.create_category(create("P", None)).await.unwrap();
    let d = mover.create_category(create("D", Some(p.id))).await.unwrap();
    let x = mover.create_category(create("X", None)).await.unwrap();

    for round in 0..5 {
        let target = if round % 2 == 0 { Some(x.id) } else { None };
        let (moved, created) = tokio::join!(
            mover.move_category(
                p.id,
                MoveCategory {
                    new_parent_id: Some(target),
                    new_sort: None,
                },
            ),
            creator.create_category(create(&format!("Leaf {}", round), Some(d.id))),
        );

        for result in [moved.map(|_| ()), created.map(|_| ())] {
            if let Err(err) = result {
                assert!(
                    matches!(err, CategoryError::ConcurrentModification(_)),
                    "round {}: unexpected {:?}",
                    round,
                    err
                );
            }
        }
        assert_hierarchy_consistent(&repo).await;
    }
}

#[tokio::test]
async fn test_service_delete_leaf_then_parent() {
    let db = TestDatabase::new().await;
    let service = CategoryService::new(PgCategoryRepository::new(db.connection()));

    let a = service.create_category(create("A", None)).await.unwrap();
    let b = service.create_category(create("B", Some(a.id))).await.unwrap();

    assert!(matches!(
        service.delete_category(a.id).await,
        Err(CategoryError::HasChildren(_))
    ));

    service.delete_category(b.id).await.unwrap();
    service.delete_category(a.id).await.unwrap();
    assert!(matches!(
        service.get_category(a.id).await,
        Err(CategoryError::NotFound(_))
    ));
}
