//! In-process ticket store
//!
//! Keeps tickets in insertion order, which is the pool order the grouper sees.
//! A ticket belongs to the pool of every region it reports a latency for; a
//! ticket without latency attributes belongs to every pool. Assignments are
//! write-once, so two matches racing for a ticket cannot both claim it.

use super::{TicketAssigner, TicketPool};
use crate::error::{PipelineError, Result};
use crate::types::{
    latency_attribute, Assignment, Pool, Ticket, TicketId, LATENCY_ATTRIBUTE_PREFIX,
};
use crate::utils::generate_ticket_id;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

fn in_pool(ticket: &Ticket, pool: &Pool) -> bool {
    let args = &ticket.search_fields.double_args;
    args.contains_key(&latency_attribute(&pool.name))
        || !args.keys().any(|k| k.starts_with(LATENCY_ATTRIBUTE_PREFIX))
}

/// Ticket store held in memory
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<Vec<Ticket>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-built tickets, keeping their order
    pub fn with_tickets(tickets: Vec<Ticket>) -> Self {
        Self {
            tickets: RwLock::new(tickets),
        }
    }

    /// Create a ticket with a fresh id and return it
    pub async fn create_ticket(&self, double_args: HashMap<String, f64>) -> Ticket {
        let ticket = Ticket::new(generate_ticket_id(), double_args);
        self.tickets.write().await.push(ticket.clone());
        ticket
    }

    pub async fn insert(&self, ticket: Ticket) {
        self.tickets.write().await.push(ticket);
    }

    pub async fn get(&self, id: &str) -> Option<Ticket> {
        self.tickets.read().await.iter().find(|t| t.id == id).cloned()
    }

    /// Remove a ticket, returning it when it existed
    pub async fn delete(&self, id: &str) -> Option<Ticket> {
        let mut tickets = self.tickets.write().await;
        let index = tickets.iter().position(|t| t.id == id)?;
        Some(tickets.remove(index))
    }

    /// Connection assigned to a ticket, if any
    pub async fn assignment(&self, id: &str) -> Option<String> {
        self.get(id)
            .await
            .and_then(|t| t.assignment.map(|a| a.connection))
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }

    pub async fn unassigned_count(&self) -> usize {
        self.tickets
            .read()
            .await
            .iter()
            .filter(|t| !t.is_assigned())
            .count()
    }
}

#[async_trait]
impl TicketPool for InMemoryTicketStore {
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>> {
        let tickets: Vec<Ticket> = self
            .tickets
            .read()
            .await
            .iter()
            .filter(|t| !t.is_assigned() && in_pool(t, pool))
            .cloned()
            .collect();

        debug!(pool = %pool.name, count = tickets.len(), "Queried in-memory pool");
        Ok(tickets)
    }
}

#[async_trait]
impl TicketAssigner for InMemoryTicketStore {
    async fn assign_tickets(&self, ticket_ids: &[TicketId], connection: &str) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        let assign_error = |message: String| PipelineError::AssignmentFailed {
            connection: connection.to_string(),
            ticket_count: ticket_ids.len(),
            message,
        };

        // Nothing is written unless every ticket can take the assignment
        for id in ticket_ids {
            match tickets.iter().find(|t| &t.id == id) {
                None => return Err(assign_error(format!("ticket '{}' not found", id)).into()),
                Some(Ticket {
                    assignment: Some(existing),
                    ..
                }) => {
                    return Err(assign_error(format!(
                        "ticket '{}' already assigned to {}",
                        id, existing.connection
                    ))
                    .into())
                }
                Some(_) => {}
            }
        }

        for ticket in tickets.iter_mut().filter(|t| ticket_ids.contains(&t.id)) {
            ticket.assignment = Some(Assignment {
                connection: connection.to_string(),
            });
        }

        Ok(())
    }
}
