pub mod priority_reset;
