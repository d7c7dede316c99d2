use crate::repository::{generate_part, generate_widget, Part, Widget};
use dskit::errors::{DsError, ErrorKind};
use dskit::repository::Repo;
use dskit::store::{Key, TransactionOptions};
use dskit::transaction::{run_in_transaction, run_in_transaction_with, Txn};
use dskit_int_test::test_util::{cleanup, create_test_context, run_test};

#[test]
fn test_pending_keys_resolve_after_commit() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(3);

            let (saved, commit) = run_in_transaction(&ctx.ctx(), ctx.client(), |txn| {
                repo.create(&ctx.ctx(), Some(txn), None, &mut widget)
            })?;
            assert!(saved.complete().is_none());

            let key = saved.resolve(&commit).expect("commit resolves the key");
            assert!(key.is_complete());
            let loaded = repo.read(&ctx.ctx(), None, &key)?;
            assert_eq!(loaded.size, 3);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failed_function_rolls_back() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let key = Key::name_key("Widget", "doomed", None);

            let result = run_in_transaction(&ctx.ctx(), ctx.client(), |txn| {
                let mut widget = generate_widget(1);
                repo.create_with_key(&ctx.ctx(), Some(txn), &key, &mut widget)?;
                Err::<(), _>(DsError::new("changed my mind", ErrorKind::Cancelled))
            });

            let err = result.err().expect("function failed");
            assert_eq!(err.kind(), &ErrorKind::Cancelled);
            assert!(!repo.exists(&ctx.ctx(), None, &key)?);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_reads_inside_transaction_see_committed_state() {
    run_test(
        create_test_context,
        |ctx| {
            let widgets: Repo<Widget> = Repo::for_entity(ctx.client());
            let parts: Repo<Part> = Repo::for_entity(ctx.client());
            let mut widget = generate_widget(2);
            let parent = widgets.create(&ctx.ctx(), None, None, &mut widget)?.key().clone();

            let txn = Txn::begin(&ctx.ctx(), ctx.client(), TransactionOptions::default())?;
            let current = widgets.read(&ctx.ctx(), Some(&txn), &parent)?;
            let mut part = generate_part(&parent, current.size * 2);
            parts.create(&ctx.ctx(), Some(&txn), Some(&parent), &mut part)?;
            assert_eq!(parts.count(&ctx.ctx(), None, Some(&parent))?, 0);

            let commit = txn.commit()?;
            assert_eq!(commit.keys().len(), 1);
            assert!(!txn.is_active());

            let stored = parts.list_all(&ctx.ctx(), None, Some(&parent))?;
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].quantity, 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_read_only_transaction_rejects_writes() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let result = run_in_transaction_with(
                &ctx.ctx(),
                ctx.client(),
                TransactionOptions::read_only(),
                |txn| {
                    let mut widget = generate_widget(1);
                    repo.create(&ctx.ctx(), Some(txn), None, &mut widget)
                },
            );
            assert!(result.is_err());
            assert_eq!(repo.count(&ctx.ctx(), None, None)?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_finished_transaction_cannot_be_reused() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let txn = ctx.kit().new_txn(&ctx.ctx())?;
            txn.rollback()?;

            let mut widget = generate_widget(1);
            let err = repo
                .create(&ctx.ctx(), Some(&txn), None, &mut widget)
                .err()
                .expect("transaction is finished");
            assert_ne!(err.kind(), &ErrorKind::NoSuchEntity);
            Ok(())
        },
        cleanup,
    )
}
