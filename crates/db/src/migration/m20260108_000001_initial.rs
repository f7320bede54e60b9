//! Initial database migration.
//!
//! Creates the enums, tables, indexes and triggers for companies, users,
//! approval flows, expenses and approval requests.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TENANTS & USERS
        // ============================================================
        db.execute_unprepared(COMPANIES_SQL).await?;
        db.execute_unprepared(USERS_SQL).await?;

        // ============================================================
        // PART 3: APPROVAL FLOWS
        // ============================================================
        db.execute_unprepared(APPROVAL_FLOWS_SQL).await?;
        db.execute_unprepared(APPROVAL_FLOW_STEPS_SQL).await?;

        // ============================================================
        // PART 4: EXPENSES & APPROVAL REQUESTS
        // ============================================================
        db.execute_unprepared(EXPENSES_SQL).await?;
        db.execute_unprepared(APPROVAL_REQUESTS_SQL).await?;

        // ============================================================
        // PART 5: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE user_role AS ENUM ('EMPLOYEE', 'MANAGER', 'ADMIN');

CREATE TYPE approval_rule_type AS ENUM (
    'UNANIMOUS',
    'PERCENTAGE',
    'SPECIFIC',
    'HYBRID'
);

-- Used by both expenses and approval requests
CREATE TYPE approval_status AS ENUM ('PENDING', 'APPROVED', 'REJECTED');
";

const COMPANIES_SQL: &str = r"
CREATE TABLE companies (
    id              UUID PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id              UUID PRIMARY KEY,
    company_id      UUID NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name            VARCHAR(255) NOT NULL,
    email           VARCHAR(255) NOT NULL UNIQUE,
    role            user_role NOT NULL DEFAULT 'EMPLOYEE',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_users_company_role ON users(company_id, role);
";

const APPROVAL_FLOWS_SQL: &str = r"
CREATE TABLE approval_flows (
    id                      UUID PRIMARY KEY,
    company_id              UUID NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name                    VARCHAR(255) NOT NULL,
    rule_type               approval_rule_type NOT NULL,
    percentage_threshold    NUMERIC(5, 2),
    specific_approver_id    UUID REFERENCES users(id),
    is_active               BOOLEAN NOT NULL DEFAULT TRUE,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_threshold_range CHECK (
        percentage_threshold IS NULL
        OR (percentage_threshold > 0 AND percentage_threshold <= 100)
    ),
    CONSTRAINT chk_threshold_required CHECK (
        rule_type NOT IN ('PERCENTAGE', 'HYBRID') OR percentage_threshold IS NOT NULL
    ),
    CONSTRAINT chk_specific_required CHECK (
        rule_type NOT IN ('SPECIFIC', 'HYBRID') OR specific_approver_id IS NOT NULL
    )
);

-- At most one active flow per company
CREATE UNIQUE INDEX idx_approval_flows_one_active
    ON approval_flows(company_id) WHERE is_active;
CREATE INDEX idx_approval_flows_company ON approval_flows(company_id, created_at DESC);
";

const APPROVAL_FLOW_STEPS_SQL: &str = r"
CREATE TABLE approval_flow_steps (
    id                  UUID PRIMARY KEY,
    flow_id             UUID NOT NULL REFERENCES approval_flows(id) ON DELETE CASCADE,
    step_order          INTEGER NOT NULL CHECK (step_order >= 1),
    approver_role       user_role,
    approver_user_id    UUID REFERENCES users(id),

    CONSTRAINT uq_flow_step_order UNIQUE (flow_id, step_order),
    CONSTRAINT chk_single_approver_rule CHECK (
        (approver_role IS NULL) <> (approver_user_id IS NULL)
    )
);
";

const EXPENSES_SQL: &str = r"
CREATE TABLE expenses (
    id              UUID PRIMARY KEY,
    company_id      UUID NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    submitted_by    UUID NOT NULL REFERENCES users(id),
    description     VARCHAR(1000) NOT NULL,
    amount          NUMERIC(19, 4) NOT NULL CHECK (amount > 0),
    currency        VARCHAR(3) NOT NULL,
    status          approval_status NOT NULL DEFAULT 'PENDING',
    flow_id         UUID REFERENCES approval_flows(id),
    current_step    INTEGER NOT NULL DEFAULT 0 CHECK (current_step >= 0),
    version         BIGINT NOT NULL DEFAULT 1,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_expenses_company ON expenses(company_id, created_at DESC);
";

const APPROVAL_REQUESTS_SQL: &str = r"
CREATE TABLE approval_requests (
    id              UUID PRIMARY KEY,
    expense_id      UUID NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
    approver_id     UUID NOT NULL REFERENCES users(id),
    step_order      INTEGER NOT NULL CHECK (step_order >= 1),
    status          approval_status NOT NULL DEFAULT 'PENDING',
    comment         TEXT,
    decided_at      TIMESTAMPTZ,
    overridden_by   UUID REFERENCES users(id),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_request_per_approver UNIQUE (expense_id, step_order, approver_id),
    CONSTRAINT chk_decided_at CHECK ((status = 'PENDING') = (decided_at IS NULL))
);

CREATE INDEX idx_approval_requests_approver_pending
    ON approval_requests(approver_id, created_at DESC) WHERE status = 'PENDING';
CREATE INDEX idx_approval_requests_expense ON approval_requests(expense_id, step_order);
";

const TRIGGERS_SQL: &str = r"
-- A decided request never changes again
CREATE OR REPLACE FUNCTION prevent_redecision()
RETURNS TRIGGER AS $$
BEGIN
    IF OLD.status <> 'PENDING' THEN
        RAISE EXCEPTION 'approval request % is already %', OLD.id, OLD.status;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_approval_requests_immutable
    BEFORE UPDATE ON approval_requests
    FOR EACH ROW EXECUTE FUNCTION prevent_redecision();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS approval_requests CASCADE;
DROP TABLE IF EXISTS expenses CASCADE;
DROP TABLE IF EXISTS approval_flow_steps CASCADE;
DROP TABLE IF EXISTS approval_flows CASCADE;
DROP TABLE IF EXISTS users CASCADE;
DROP TABLE IF EXISTS companies CASCADE;

DROP FUNCTION IF EXISTS prevent_redecision() CASCADE;

DROP TYPE IF EXISTS approval_status;
DROP TYPE IF EXISTS approval_rule_type;
DROP TYPE IF EXISTS user_role;
";
