pub mod common;

mod concurrency_test;
mod config_test;
mod device_test;
mod sync_test;
