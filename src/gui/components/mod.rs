pub mod result_view;
pub mod tuning_controls;
