pub mod bird_tool_reads;
