use crate::repository::{generate_widget, Widget};
use dskit::errors::ErrorKind;
use dskit::repository::Repo;
use dskit::store::{field, Query};
use dskit_int_test::test_util::{cleanup, create_test_context, run_test, TestContext};
use fake::Fake;

fn seed_sizes(ctx: &TestContext, sizes: &[i64]) -> dskit::errors::DsResult<()> {
    let repo: Repo<Widget> = Repo::for_entity(ctx.client());
    let mut widgets: Vec<Widget> = sizes.iter().copied().map(generate_widget).collect();
    repo.create_multi(&ctx.ctx(), None, None, &mut widgets)?;
    Ok(())
}

#[test]
fn test_sum_matches_integer_total() {
    run_test(
        create_test_context,
        |ctx| {
            let sizes: Vec<i64> = (0..12).map(|_| (1..1000).fake::<i64>()).collect();
            seed_sizes(&ctx, &sizes)?;
            let kit = ctx.kit();
            let query = Query::new("Widget");

            let total = kit.sum_field(&ctx.ctx(), None, Some(&query), "size")?;
            assert_eq!(total, sizes.iter().sum::<i64>() as f64);

            let (total, count) = kit.sum_field_with_count(&ctx.ctx(), None, Some(&query), "size")?;
            assert_eq!(total, sizes.iter().sum::<i64>() as f64);
            assert_eq!(count, 12);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_counts_and_existence() {
    run_test(
        create_test_context,
        |ctx| {
            seed_sizes(&ctx, &[1, 2, 3])?;
            let kit = ctx.kit();

            assert_eq!(kit.count(&ctx.ctx(), None, "Widget", None)?, 3);
            let big = Query::new("Widget").filter(field("size").gte(2));
            assert_eq!(kit.count_for_query(&ctx.ctx(), None, Some(&big))?, 2);
            assert!(kit.exists_for_query(&ctx.ctx(), None, Some(&big))?);

            let none = Query::new("Widget").filter(field("size").gt(3));
            assert!(!kit.exists_for_query(&ctx.ctx(), None, Some(&none))?);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_multi_field_averages() {
    run_test(
        create_test_context,
        |ctx| {
            seed_sizes(&ctx, &[2, 4, 6])?;
            let kit = ctx.kit();
            let query = Query::new("Widget");

            assert_eq!(kit.avg_field(&ctx.ctx(), None, Some(&query), "size")?, 4.0);
            let (averages, count) =
                kit.avg_fields_with_count(&ctx.ctx(), None, Some(&query), &["size", "weight"])?;
            assert_eq!(count, 3);
            assert_eq!(averages["size"], 4.0);
            assert_eq!(averages["weight"], 2.0);

            let combined =
                kit.query_aggregations_with_count(&ctx.ctx(), None, Some(&query), &["size"], &["size"])?;
            assert_eq!(combined.count, Some(3));
            assert_eq!(combined.sums["size"], 12.0);
            assert_eq!(combined.averages["size"], 4.0);

            let without = kit.query_aggregations(&ctx.ctx(), None, Some(&query), &["weight"], &[])?;
            assert_eq!(without.count, None);
            assert_eq!(without.sums["weight"], 6.0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_aggregation_arguments_are_checked() {
    run_test(
        create_test_context,
        |ctx| {
            let kit = ctx.kit();
            let query = Query::new("Widget");

            let err = kit
                .sum_field(&ctx.ctx(), None, Some(&query), "")
                .err()
                .expect("empty field");
            assert_eq!(err.kind(), &ErrorKind::InvalidArgument);

            let err = kit
                .sum_field(&ctx.ctx(), None, None, "size")
                .err()
                .expect("no query");
            assert_eq!(err.message(), "query cannot be nil");

            let err = kit
                .query_aggregations(&ctx.ctx(), None, Some(&query), &[] as &[&str], &[])
                .err()
                .expect("no fields");
            assert_eq!(err.message(), "at least one field must be provided");

            let fields = ["a", "b", "c", "d", "e", "f"];
            let err = kit
                .sum_fields(&ctx.ctx(), None, Some(&query), &fields)
                .err()
                .expect("too many aggregations");
            assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
            Ok(())
        },
        cleanup,
    )
}
