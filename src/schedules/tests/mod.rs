// src/schedules/tests/mod.rs

mod validators_tests;
