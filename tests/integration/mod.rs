mod announce_pipeline;
mod mops_client;
mod screener_workflow;
