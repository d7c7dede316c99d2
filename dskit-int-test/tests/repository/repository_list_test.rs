use crate::repository::{generate_widget, Widget, WidgetSize};
use dskit::common::PropertyMap;
use dskit::repository::Repo;
use dskit::store::{field, Direction, Query};
use dskit_int_test::test_util::{cleanup, create_small_batch_context, create_test_context, run_test};
use std::collections::BTreeSet;

fn seed(repo: &Repo<Widget>, ctx: &dskit::context::Context, count: i64) -> dskit::errors::DsResult<()> {
    let mut widgets: Vec<Widget> = (1..=count).map(generate_widget).collect();
    repo.create_multi(ctx, None, None, &mut widgets)?;
    Ok(())
}

#[test]
fn test_cursor_pages_have_no_overlap_and_no_gap() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 10)?;

            let mut seen = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let (page, next) = repo.list(&ctx.ctx(), None, None, Some(3), cursor.as_deref())?;
                if page.is_empty() {
                    break;
                }
                assert!(page.len() <= 3);
                seen.extend(page.into_iter().map(|w| w.size));
                cursor = Some(next.encode());
            }

            seen.sort_unstable();
            assert_eq!(seen, (1..=10).collect::<Vec<_>>());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_list_all_spans_store_batches() {
    run_test(
        || create_small_batch_context(2),
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 7)?;

            let all = repo.list_all(&ctx.ctx(), None, None)?;
            assert_eq!(all.len(), 7);

            let keys = repo.list_all_keys(&ctx.ctx(), None, None)?;
            let distinct: BTreeSet<_> = keys.iter().map(|k| k.id()).collect();
            assert_eq!(distinct.len(), 7);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_list_page_by_offset() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 6)?;

            let (first, _) = repo.list_page(&ctx.ctx(), None, None, Some(4), 0)?;
            let (rest, _) = repo.list_page(&ctx.ctx(), None, None, Some(4), 4)?;
            assert_eq!(first.len(), 4);
            assert_eq!(rest.len(), 2);

            let mut sizes: Vec<i64> = first.iter().chain(rest.iter()).map(|w| w.size).collect();
            sizes.sort_unstable();
            assert_eq!(sizes, vec![1, 2, 3, 4, 5, 6]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_list_keys_pages() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 5)?;

            let (keys, cursor) = repo.list_keys(&ctx.ctx(), None, None, Some(2), None)?;
            assert_eq!(keys.len(), 2);
            let encoded = cursor.encode();
            let (more, _) = repo.list_keys(&ctx.ctx(), None, None, None, Some(&encoded))?;
            assert_eq!(more.len(), 3);
            assert!(keys.iter().all(|k| !more.contains(k)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_projection_into_row_types() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 4)?;

            let rows: Vec<WidgetSize> =
                repo.list_all_projection(&ctx.ctx(), None, None, WidgetSize::default, &["name", "size"])?;
            assert_eq!(rows.len(), 4);
            assert!(rows.iter().all(|r| !r.name.is_empty()));

            let (maps, _) = repo.list_projection(
                &ctx.ctx(),
                None,
                None,
                Some(2),
                None,
                PropertyMap::new,
                &["size"],
            )?;
            assert_eq!(maps.len(), 2);
            assert!(maps.iter().all(|m| m.len() == 1 && m.contains("size")));

            let (page, _) = repo.list_page_projection(
                &ctx.ctx(),
                None,
                None,
                Some(10),
                3,
                PropertyMap::new,
                &["name"],
            )?;
            assert_eq!(page.len(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_query_with_filter_and_order() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            seed(&repo, &ctx.ctx(), 8)?;

            let query = Query::new("Widget")
                .filter(field("size").gt(5))
                .order_by("size", Direction::Descending);
            let (big, _) = repo.query(&ctx.ctx(), None, Some(query))?;
            let sizes: Vec<i64> = big.iter().map(|w| w.size).collect();
            assert_eq!(sizes, vec![8, 7, 6]);

            let one = repo.query_one(
                &ctx.ctx(),
                None,
                Query::new("Widget").filter(field("size").eq(3)),
            )?;
            assert_eq!(one.size, 3);

            let err = repo
                .query_one(&ctx.ctx(), None, Query::new("Widget").filter(field("size").eq(99)))
                .err()
                .expect("nothing matches");
            assert!(err.is_not_found());
            Ok(())
        },
        cleanup,
    )
}
