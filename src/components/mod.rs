pub mod branch_graph;
