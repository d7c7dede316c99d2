use crate::repository::{generate_widget, Label, Widget};
use dskit::entity::Entity;
use dskit::errors::ErrorKind;
use dskit::store::Key;
use dskit_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_registered_kind_reads_back_as_concrete_type() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.registry().register::<Widget>();
            let kit = ctx.kit();

            let mut widget = generate_widget(11);
            let saved = kit.create(&ctx.ctx(), None, None, &mut widget)?;
            let key = saved.key().clone();

            let record = kit.read(&ctx.ctx(), None, Some(&key))?;
            assert_eq!(record.kind(), "Widget");
            let loaded = record.downcast_ref::<Widget>().expect("a widget");
            assert_eq!(loaded, &widget);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unregistered_kind_cannot_be_read() {
    run_test(
        create_test_context,
        |ctx| {
            let kit = ctx.kit();
            let key = Key::name_key("Widget", "nobody", None);
            let err = kit.read(&ctx.ctx(), None, Some(&key)).err().expect("not registered");
            assert_eq!(err.kind(), &ErrorKind::NotRegistered);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_writes_register_kinds() {
    run_test(
        create_test_context,
        |ctx| {
            let kit = ctx.kit();
            assert!(!ctx.registry().is_registered("Label"));

            let mut label = Label {
                key: None,
                text: "urgent".to_string(),
            };
            let key = kit.create(&ctx.ctx(), None, None, &mut label)?.key().clone();
            assert!(ctx.registry().is_registered("Label"));

            let record = kit.read(&ctx.ctx(), None, Some(&key))?;
            assert_eq!(record.downcast_ref::<Label>(), Some(&label));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_mixed_kinds_in_one_batch() {
    run_test(
        create_test_context,
        |ctx| {
            let kit = ctx.kit();
            let mut records: Vec<Box<dyn Entity>> = vec![
                Box::new(generate_widget(1)),
                Box::new(Label {
                    key: None,
                    text: "mixed".to_string(),
                }),
            ];
            let saved = kit.create_multi(&ctx.ctx(), None, &[], &mut records)?;
            let keys: Vec<Key> = saved.iter().map(|s| s.key().clone()).collect();
            assert_eq!(keys[0].kind(), "Widget");
            assert_eq!(keys[1].kind(), "Label");

            let loaded = kit.read_multi(&ctx.ctx(), None, &keys)?;
            assert!(loaded[0].downcast_ref::<Widget>().is_some());
            assert_eq!(
                loaded[1].downcast_ref::<Label>().map(|l| l.text.as_str()),
                Some("mixed")
            );

            if let Some(widget) = records[0].downcast_mut::<Widget>() {
                widget.size = 100;
            }
            kit.update_multi(&ctx.ctx(), None, &[], &mut records)?;
            let reread = kit.read(&ctx.ctx(), None, Some(&keys[0]))?;
            assert_eq!(reread.downcast_ref::<Widget>().map(|w| w.size), Some(100));

            kit.delete_multi(&ctx.ctx(), None, &keys)?;
            assert!(!kit.exists(&ctx.ctx(), None, Some(&keys[1]))?);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_list_and_list_all_by_kind() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.registry().register::<Widget>();
            let kit = ctx.kit();
            for size in 1..=5 {
                let mut widget = generate_widget(size);
                kit.create(&ctx.ctx(), None, None, &mut widget)?;
            }

            let (page, cursor) = kit.list(&ctx.ctx(), None, "Widget", None, Some(2), None)?;
            assert_eq!(page.len(), 2);
            let encoded = cursor.encode();
            let (rest, _) = kit.list(&ctx.ctx(), None, "Widget", None, None, Some(&encoded))?;
            assert_eq!(rest.len(), 3);

            let all = kit.list_all(&ctx.ctx(), None, "Widget", None)?;
            assert_eq!(all.len(), 5);

            let err = kit.list_all(&ctx.ctx(), None, "", None).err().expect("empty kind");
            assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_update_and_delete_through_own_key() {
    run_test(
        create_test_context,
        |ctx| {
            let kit = ctx.kit();
            let mut widget = generate_widget(4);
            let key = kit.create(&ctx.ctx(), None, None, &mut widget)?.key().clone();

            std::thread::sleep(std::time::Duration::from_millis(2));
            widget.name = "renamed".to_string();
            kit.update(&ctx.ctx(), None, None, &mut widget)?;
            let record = kit.read(&ctx.ctx(), None, Some(&key))?;
            let loaded = record.downcast_ref::<Widget>().expect("a widget");
            assert_eq!(loaded.name, "renamed");
            assert!(loaded.meta.updated() > loaded.meta.created());

            kit.delete(&ctx.ctx(), None, Some(&key))?;
            let err = kit.read(&ctx.ctx(), None, Some(&key)).err().expect("deleted");
            assert!(err.is_not_found());
            Ok(())
        },
        cleanup,
    )
}
