//! Greedy contiguous grouping of scored tickets
//!
//! Tickets are scored once, stably sorted by descending score and cut into
//! consecutive chunks of a fixed size. Leftover tickets stay in the pool for
//! the next cycle.

use crate::types::Ticket;

/// A fixed-size group of tickets and the sum of their scores
#[derive(Debug, Clone, PartialEq)]
pub struct TicketGroup {
    pub tickets: Vec<Ticket>,
    pub score: f64,
}

/// Partitions tickets into fixed-size candidate matches
#[derive(Debug, Clone, Copy)]
pub struct TicketGrouper {
    tickets_per_match: usize,
}

impl TicketGrouper {
    pub fn new(tickets_per_match: usize) -> Self {
        Self { tickets_per_match }
    }

    pub fn tickets_per_match(&self) -> usize {
        self.tickets_per_match
    }

    /// Group tickets, highest scores first
    ///
    /// Ties keep their pool order. Returns no groups when fewer than
    /// `tickets_per_match` tickets are supplied.
    pub fn group<F>(&self, tickets: Vec<Ticket>, score: F) -> Vec<TicketGroup>
    where
        F: Fn(&Ticket) -> f64,
    {
        let size = self.tickets_per_match;
        if size == 0 || tickets.len() < size {
            return Vec::new();
        }

        let mut scored: Vec<(f64, Ticket)> = tickets.into_iter().map(|t| (score(&t), t)).collect();
        // sort_by is stable, so equal scores keep pool order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let group_count = scored.len() / size;
        scored.truncate(group_count * size);

        let mut groups = Vec::with_capacity(group_count);
        let mut remaining = scored.into_iter();
        for _ in 0..group_count {
            let members: Vec<(f64, Ticket)> = remaining.by_ref().take(size).collect();
            let group_score: f64 = members.iter().map(|(s, _)| s).sum();
            groups.push(TicketGroup {
                tickets: members.into_iter().map(|(_, t)| t).collect(),
                score: group_score,
            });
        }

        groups
    }
}
