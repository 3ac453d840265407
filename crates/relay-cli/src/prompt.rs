use anyhow::Result;
use relay::models::message::Message;

pub mod cliclack;
pub mod thinking;

pub trait Prompt {
    fn render(&mut self, message: &Message);
    fn render_notice(&mut self, notice: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn relay_ready(&self) {
        println!("\n");
        println!("FlightAI is ready! Ask about fares or book a return ticket.");
        println!("\n");
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

pub enum InputType {
    Message, // User sent a message
    Exit,    // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
