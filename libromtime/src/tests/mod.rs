mod capture_builder;
