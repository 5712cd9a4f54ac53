pub mod artificial_read_utils;
