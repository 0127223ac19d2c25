//! On-flash layout tests

mod page_tests;
mod scanner_tests;
