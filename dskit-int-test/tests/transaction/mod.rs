mod transaction_repository_test;
