mod common;

mod supervisor_tests;
