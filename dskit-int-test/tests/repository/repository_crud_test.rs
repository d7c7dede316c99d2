use crate::repository::{generate_part, generate_widget, Label, Part, Status, Widget};
use chrono::Utc;
use dskit::repository::Repo;
use dskit::store::Key;
use dskit_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_create_without_key_then_read() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(7);

            let saved = repo.create(&ctx.ctx(), None, None, &mut widget)?;
            let key = saved.complete().cloned().expect("key should be complete");
            assert_eq!(key.kind(), "Widget");
            assert!(key.id().is_some());
            assert_eq!(widget.meta.key(), Some(&key));
            let created = widget.meta.created().time().expect("created is stamped");
            assert!(Utc::now() - created < chrono::Duration::seconds(60));

            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded, widget);
            assert_eq!(loaded.status, Status::Active);
            assert_eq!(loaded.dimensions, widget.dimensions);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_create_with_named_key() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let key = Key::name_key("Widget", "gear", None);
            let mut widget = generate_widget(3);

            let saved = repo.create_with_key(&ctx.ctx(), None, &key, &mut widget)?;
            assert_eq!(saved.key(), &key);

            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded.name, widget.name);
            assert_eq!(loaded.meta.key().and_then(Key::name), Some("gear"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_restamps_updated() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(1);
            let saved = repo.create(&ctx.ctx(), None, None, &mut widget)?;
            let key = saved.key().clone();
            let created = widget.meta.created();

            std::thread::sleep(std::time::Duration::from_millis(2));
            widget.size = 42;
            widget.status = Status::Retired;
            repo.update(&ctx.ctx(), None, &mut widget)?;

            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded.size, 42);
            assert_eq!(loaded.status, Status::Retired);
            assert_eq!(loaded.meta.created(), created);
            assert!(loaded.meta.updated() > loaded.meta.created());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_then_exists() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(5);
            let key = repo.create(&ctx.ctx(), None, None, &mut widget)?.key().clone();

            assert!(repo.exists(&ctx.ctx(), None, &key)?);
            repo.delete(&ctx.ctx(), None, &key)?;
            assert!(!repo.exists(&ctx.ctx(), None, &key)?);

            let err = repo.read(&ctx.ctx(), None, &key).err().expect("read should fail");
            assert!(err.is_not_found());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_create_multi_and_read_multi() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widgets: Vec<Widget> = (1..=4).map(generate_widget).collect();

            let saved = repo.create_multi(&ctx.ctx(), None, None, &mut widgets)?;
            assert_eq!(saved.len(), 4);
            let keys: Vec<Key> = saved.iter().map(|s| s.key().clone()).collect();

            let loaded = repo.read_multi(&ctx.ctx(), None, &keys)?;
            assert_eq!(loaded, widgets);

            for widget in widgets.iter_mut() {
                widget.size *= 10;
            }
            repo.update_multi(&ctx.ctx(), None, &mut widgets)?;
            let sizes: Vec<i64> = repo
                .read_multi(&ctx.ctx(), None, &keys)?
                .into_iter()
                .map(|w| w.size)
                .collect();
            assert_eq!(sizes, vec![10, 20, 30, 40]);

            repo.delete_multi(&ctx.ctx(), None, &keys)?;
            assert_eq!(repo.count(&ctx.ctx(), None, None)?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_child_entities_under_parent() {
    run_test(
        create_test_context,
        |ctx| {
            let widgets: Repo<Widget> = Repo::for_entity(ctx.client());
            let parts: Repo<Part> = Repo::for_entity(ctx.client());

            let mut widget = generate_widget(2);
            let parent = widgets.create(&ctx.ctx(), None, None, &mut widget)?.key().clone();

            let mut part = generate_part(&parent, 3);
            part.scratch = "not stored".to_string();
            let key = parts.create(&ctx.ctx(), None, None, &mut part)?.key().clone();
            assert_eq!(key.parent(), Some(&parent));

            let loaded = parts.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded.number, part.number);
            assert_eq!(loaded.widget, Some(parent.clone()));
            assert!(loaded.scratch.is_empty());
            assert!(loaded.meta.created().is_valid());

            let (children, _) = parts.list(&ctx.ctx(), None, Some(&parent), None, None)?;
            assert_eq!(children.len(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_plain_key_field_entity() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Label> = Repo::for_entity(ctx.client());
            let mut label = Label {
                key: None,
                text: "fragile".to_string(),
            };

            let key = repo.create(&ctx.ctx(), None, None, &mut label)?.key().clone();
            assert_eq!(label.key, Some(key.clone()));

            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded, label);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_repository_bound_to_another_kind() {
    run_test(
        create_test_context,
        |ctx| {
            let gizmos: Repo<Widget> = Repo::new(ctx.client(), "Gizmo")?;
            let mut widget = generate_widget(6);
            let key = gizmos.create(&ctx.ctx(), None, None, &mut widget)?.key().clone();
            assert_eq!(key.kind(), "Gizmo");

            let mut more: Vec<Widget> = (1..=2).map(generate_widget).collect();
            gizmos.create_multi(&ctx.ctx(), None, None, &mut more)?;

            let (listed, _) = gizmos.list(&ctx.ctx(), None, None, None, None)?;
            assert_eq!(listed.len(), 3);
            assert!(listed.iter().any(|w| w.name == widget.name));
            assert_eq!(gizmos.read(&ctx.ctx(), None, &key)?, widget);

            let widgets: Repo<Widget> = Repo::for_entity(ctx.client());
            assert_eq!(widgets.count(&ctx.ctx(), None, None)?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_repeated_upserts_keep_created() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let key = Key::name_key("Widget", "sprocket", None);
            let mut widget = generate_widget(4);

            repo.update_with_key(&ctx.ctx(), None, &key, &mut widget)?;
            let first = repo.read(&ctx.ctx(), None, &key)?.meta.created();
            assert!(first.is_valid());

            std::thread::sleep(std::time::Duration::from_millis(2));
            widget.size = 8;
            repo.update_with_key(&ctx.ctx(), None, &key, &mut widget)?;

            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded.size, 8);
            assert_eq!(loaded.meta.created(), first);
            Ok(())
        },
        cleanup,
    )
}
