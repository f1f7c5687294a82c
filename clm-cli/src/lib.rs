pub mod cli;
pub mod course;
pub mod workers_state;

#[cfg(test)]
test_r::enable!();
