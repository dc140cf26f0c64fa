
mod test_load_budget_limiter;
mod test_thread_scheduler;
