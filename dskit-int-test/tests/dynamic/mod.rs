mod dynamic_aggregate_test;
mod dynamic_facade_test;
