// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod infer_tests;
pub mod parser_tests;
pub mod registry_tests;
