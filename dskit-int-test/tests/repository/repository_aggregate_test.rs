use crate::repository::{generate_part, generate_widget, Part, Widget};
use dskit::errors::ErrorKind;
use dskit::repository::Repo;
use dskit::store::{field, Query};
use dskit_int_test::test_util::{cleanup, create_small_batch_context, create_test_context, run_test};

#[test]
fn test_count_with_and_without_ancestor() {
    run_test(
        create_test_context,
        |ctx| {
            let widgets: Repo<Widget> = Repo::for_entity(ctx.client());
            let parts: Repo<Part> = Repo::for_entity(ctx.client());

            let mut first = generate_widget(1);
            let mut second = generate_widget(2);
            let a = widgets.create(&ctx.ctx(), None, None, &mut first)?.key().clone();
            let b = widgets.create(&ctx.ctx(), None, None, &mut second)?.key().clone();

            let mut under_a: Vec<Part> = (1..=3).map(|q| generate_part(&a, q)).collect();
            parts.create_multi(&ctx.ctx(), None, None, &mut under_a)?;
            let mut under_b = generate_part(&b, 9);
            parts.create(&ctx.ctx(), None, None, &mut under_b)?;

            assert_eq!(widgets.count(&ctx.ctx(), None, None)?, 2);
            assert_eq!(parts.count(&ctx.ctx(), None, None)?, 4);
            assert_eq!(parts.count(&ctx.ctx(), None, Some(&a))?, 3);
            assert_eq!(parts.count(&ctx.ctx(), None, Some(&b))?, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_sums_follow_field_types() {
    run_test(
        || create_small_batch_context(3),
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widgets: Vec<Widget> = (1..=10).map(generate_widget).collect();
            repo.create_multi(&ctx.ctx(), None, None, &mut widgets)?;

            let sums = repo.sum_fields(&ctx.ctx(), None, None, &["size", "weight"])?;
            assert_eq!(sums["size"], 55.0);
            assert_eq!(sums["weight"], 27.5);

            let filtered = Query::new("Widget").filter(field("size").lte(4));
            let averages = repo.avg_fields(&ctx.ctx(), None, Some(filtered), &["size"])?;
            assert_eq!(averages["size"], 2.5);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_combined_aggregation() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let mut widgets: Vec<Widget> = (1..=4).map(generate_widget).collect();
            repo.create_multi(&ctx.ctx(), None, None, &mut widgets)?;

            let result = repo.aggregate(&ctx.ctx(), None, None, &["size"], &["weight"])?;
            assert_eq!(result.count, Some(4));
            assert_eq!(result.sums["size"], 10.0);
            assert_eq!(result.averages["weight"], 1.25);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_average_of_empty_set_fails() {
    run_test(
        create_test_context,
        |ctx| {
            let repo: Repo<Widget> = Repo::for_entity(ctx.client());
            let err = repo
                .avg_fields(&ctx.ctx(), None, None, &["size"])
                .err()
                .expect("average of nothing has no value");
            assert_eq!(err.kind(), &ErrorKind::InvalidDataType);

            let sums = repo.sum_fields(&ctx.ctx(), None, None, &["size"])?;
            assert_eq!(sums["size"], 0.0);
            Ok(())
        },
        cleanup,
    )
}
