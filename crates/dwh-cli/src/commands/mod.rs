pub mod etl;
pub mod provision;
