use serde::{Deserialize, Serialize};

/// One answer in a poll, with its running tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub label: String,
    pub votes: u64,
}

/// A community poll shown on the home feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
}

impl Poll {
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Bump the tally for an option; false when the option is unknown.
    pub fn record_vote(&mut self, option_id: &str) -> bool {
        match self.options.iter_mut().find(|o| o.id == option_id) {
            Some(option) => {
                option.votes += 1;
                true
            }
            None => false,
        }
    }

    /// Percentage of the total an option holds, for result bars.
    pub fn option_share(&self, option_id: &str) -> Option<u8> {
        let total = self.total_votes();
        let option = self.options.iter().find(|o| o.id == option_id)?;
        if total == 0 {
            Some(0)
        } else {
            Some(((option.votes * 100) / total) as u8)
        }
    }
}
