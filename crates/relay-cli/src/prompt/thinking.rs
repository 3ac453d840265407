use rand::seq::SliceRandom;

const THINKING_MESSAGES: &[&str] = &[
    "Checking the departures board",
    "Consulting the fare tables",
    "Asking the gate agent",
    "Scanning the flight map",
    "Folding the boarding pass",
    "Looking out of the window seat",
    "Counting the overhead bins",
    "Taxiing to the runway",
];

/// A short flavour line for the busy spinner
pub fn get_random_thinking_message() -> &'static str {
    THINKING_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Thinking")
}
