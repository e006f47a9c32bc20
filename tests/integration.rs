#[path = "integration/engine_test.rs"]
mod engine_test;
#[path = "integration/update_test.rs"]
mod update_test;
