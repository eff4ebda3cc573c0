mod common;
mod pipeline;
mod pool;
