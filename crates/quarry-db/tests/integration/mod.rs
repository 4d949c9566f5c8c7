pub mod common;

mod application_tests;
mod pool_tests;
mod posting_tests;
