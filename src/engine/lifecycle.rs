use chrono::Duration;
use ulid::Ulid;

use crate::limits::CANCEL_LEAD_TIME_HOURS;
use crate::model::*;

use super::EngineError;
use super::conflict::validate_reason;

/// A status change requested on an existing reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Approve,
    Reject { reason: Option<String> },
    Cancel { reason: Option<String> },
    Complete,
}

/// A notification to send once a change has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    pub recipient: Ulid,
    pub kind: NotificationKind,
    pub title: &'static str,
    pub message: String,
}

impl Notice {
    pub(crate) fn new_request(owner_id: Ulid, equipment_name: &str) -> Self {
        Self {
            recipient: owner_id,
            kind: NotificationKind::ReservationCreated,
            title: "New Reservation Request",
            message: format!("You have a new reservation request for {equipment_name}"),
        }
    }

    pub(crate) fn auto_approved(renter_id: Ulid, equipment_name: &str) -> Self {
        Self {
            recipient: renter_id,
            kind: NotificationKind::ReservationApproved,
            title: "Reservation Approved",
            message: format!(
                "Your reservation for {equipment_name} has been automatically approved"
            ),
        }
    }

    pub(crate) fn into_draft(self, reservation_id: Ulid) -> NotificationDraft {
        NotificationDraft {
            user_id: self.recipient,
            kind: self.kind,
            title: self.title.to_string(),
            message: self.message,
            reference: Some(Reference::reservation(reservation_id)),
        }
    }
}

impl Transition {
    /// Bound and normalise the reason carried by a reject or cancel.
    pub(crate) fn validated(self) -> Result<Self, EngineError> {
        Ok(match self {
            Transition::Reject { reason } => Transition::Reject {
                reason: validate_reason(reason)?,
            },
            Transition::Cancel { reason } => Transition::Cancel {
                reason: validate_reason(reason)?,
            },
            other => other,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Reject { .. } => "reject",
            Transition::Cancel { .. } => "cancel",
            Transition::Complete => "complete",
        }
    }

    pub fn target(&self) -> ReservationStatus {
        match self {
            Transition::Approve => ReservationStatus::Approved,
            Transition::Reject { .. } => ReservationStatus::Rejected,
            Transition::Cancel { .. } => ReservationStatus::Cancelled,
            Transition::Complete => ReservationStatus::Completed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Transition::Reject { reason } | Transition::Cancel { reason } => reason.as_deref(),
            Transition::Approve | Transition::Complete => None,
        }
    }

    /// Only the equipment owner reviews and completes; either party may cancel.
    pub(crate) fn authorize(&self, actor: Ulid, reservation: &Reservation, owner_id: Ulid) -> Result<(), EngineError> {
        match self {
            Transition::Approve | Transition::Reject { .. } | Transition::Complete => {
                if actor != owner_id {
                    return Err(EngineError::Unauthorized("only the equipment owner may do this"));
                }
            }
            Transition::Cancel { .. } => {
                if actor != reservation.renter_id && actor != owner_id {
                    return Err(EngineError::Unauthorized(
                        "only the renter or the equipment owner may cancel",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Status precondition, evaluated against the status read under the equipment lock.
    pub(crate) fn check(&self, reservation: &Reservation, now: Timestamp) -> Result<(), EngineError> {
        let expect = |expected: ReservationStatus| {
            if reservation.status == expected {
                Ok(())
            } else {
                Err(EngineError::InvalidState {
                    id: reservation.id,
                    actual: reservation.status,
                    expected,
                })
            }
        };
        match self {
            Transition::Approve | Transition::Reject { .. } => expect(ReservationStatus::Pending),
            Transition::Complete => expect(ReservationStatus::Approved),
            Transition::Cancel { .. } => match reservation.status {
                ReservationStatus::Pending => Ok(()),
                ReservationStatus::Approved => {
                    if reservation.start_date < now + Duration::hours(CANCEL_LEAD_TIME_HOURS) {
                        Err(EngineError::CannotCancel {
                            id: reservation.id,
                            reason: "approved reservations starting within 24 hours cannot be cancelled",
                        })
                    } else {
                        Ok(())
                    }
                }
                _ => Err(EngineError::CannotCancel {
                    id: reservation.id,
                    reason: "reservation is no longer active",
                }),
            },
        }
    }

    /// Who hears about the change. Cancellation goes to the party that did not act.
    pub(crate) fn notice(&self, actor: Ulid, reservation: &Reservation, owner_id: Ulid, equipment_name: &str) -> Notice {
        let renter = reservation.renter_id;
        match self {
            Transition::Approve => Notice {
                recipient: renter,
                kind: NotificationKind::ReservationApproved,
                title: "Reservation Approved",
                message: format!("Your reservation for {equipment_name} has been approved"),
            },
            Transition::Reject { .. } => Notice {
                recipient: renter,
                kind: NotificationKind::ReservationRejected,
                title: "Reservation Rejected",
                message: format!("Your reservation for {equipment_name} has been rejected"),
            },
            Transition::Cancel { .. } => Notice {
                recipient: if actor == owner_id { renter } else { owner_id },
                kind: NotificationKind::ReservationCancelled,
                title: "Reservation Cancelled",
                message: format!("A reservation for {equipment_name} has been cancelled"),
            },
            Transition::Complete => Notice {
                recipient: renter,
                kind: NotificationKind::ReservationCompleted,
                title: "Reservation Completed",
                message: format!(
                    "Your reservation for {equipment_name} has been marked as completed"
                ),
            },
        }
    }
}
