//! FlashStorage tests

mod file_tests;
