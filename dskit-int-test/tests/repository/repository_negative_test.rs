use crate::repository::{generate_widget, Widget};
use dskit::common::PropertyMap;
use dskit::errors::ErrorKind;
use dskit::query::{self, Client};
use dskit::repository::Repo;
use dskit::store::Key;
use dskit_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_length_mismatch_writes_nothing() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let keys = vec![Key::name_key("Widget", "a", None)];
            let mut widgets = vec![generate_widget(1), generate_widget(2)];

            let err = repo
                .create_multi_with_keys(&ctx.ctx(), None, &keys, &mut widgets)
                .err()
                .expect("lengths differ");
            assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
            assert_eq!(err.message(), "keys and entities must have the same length");
            assert_eq!(repo.count(&ctx.ctx(), None, None)?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_requires_a_key() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(1);
            let err = repo
                .update(&ctx.ctx(), None, &mut widget)
                .err()
                .expect("unsaved widget has no key");
            assert_eq!(err.kind(), &ErrorKind::InvalidKey);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_invalid_cursor() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let err = repo
                .list(&ctx.ctx(), None, None, Some(5), Some("not a cursor!"))
                .err()
                .expect("cursor is garbage");
            assert_eq!(err.kind(), &ErrorKind::InvalidCursor);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_field_mismatch_loads_what_fits() {
    run_test(
        create_test_context,
        |ctx| {
            let client: &dyn Client = ctx.client();
            let key = Key::name_key("Widget", "legacy", None);
            let mut stored = PropertyMap::new();
            stored.put("name", "old", true);
            stored.put("size", "large", true);
            stored.put("color", "red", true);
            query::update(&ctx.ctx(), Some(client), None, Some(&key), &stored)?;

            let mut widget = Widget::default();
            let err = query::read(&ctx.ctx(), Some(client), None, Some(&key), &mut widget)
                .err()
                .expect("size and color do not fit");
            assert!(err.is_field_mismatch());
            assert!(err.message().contains("\"size\""));
            assert!(err.message().contains("\"color\""));
            assert_eq!(widget.name, "old");

            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let (rows, _) = repo.list(&ctx.ctx(), None, None, None, None)?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].name, "old");
            Ok(())
        },
        cleanup,
    )
}
