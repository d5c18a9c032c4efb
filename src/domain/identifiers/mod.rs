mod validation;

pub use validation::validate_id;
