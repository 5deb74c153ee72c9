mod calculator;
mod echo;
mod synthesiser;

pub use calculator::CalculatorAgent;
pub use echo::EchoAgent;
pub use synthesiser::AnswerSynthesiserAgent;
