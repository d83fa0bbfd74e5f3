/*!
# Excel Analytics

Upload spreadsheets, preview their rows, chart them in 2D and 3D, derive simple
descriptive statistics, and keep a history of uploads and saved analyses that
syncs to a REST backend with JWT authentication and admin roles.

## Architecture

### Client workspace
- **Technologies**: calamine, plotters, reqwest
- **Key Components**:
  - Ingestion - accepts `.xls`/`.xlsx` files, decodes the first sheet into rows
  - RowDataset - the table currently loaded, schema taken from the first row
  - InsightEngine - per-column mean/min/max for numeric columns
  - ChartSpec builder - renderer-agnostic chart descriptions (bar, line, pie, area, 3D)
  - Chart display - PNG rendering of the current chart, released before replacement
  - Upload history and analytics counters - durable local state

### Backend
- **Technologies**: Rust, axum, jsonwebtoken, argon2
- **Core Components**:
  - Auth - registration, login, bearer-token middleware
  - Uploads API - ownership-scoped upload metadata and analyses
  - Admin API - user listing and promotion
  - Document store - users and uploads as JSON documents on disk

## Data flow

file → ingestion → RowDataset → {ChartSpec builder, InsightEngine} → output.
Ingestion always records the upload locally; when signed in, the upload's
metadata is also sent to the backend in the background.

## Modules

- **dataset**: RowDataset, cell values, sample data
- **insights**: descriptive statistics
- **chart**: chart descriptions
- **graph**: PNG rendering and the chart display handle
- **loader**: file acceptance and spreadsheet decoding
- **saving**: durable local key/value storage
- **history**: upload history and saved analyses
- **analytics**: usage counters
- **client**: typed REST client
- **session**: client-side auth state
- **pipeline**: the Workspace tying the client together
- **store**: backend document store
- **login**: backend auth handlers and middleware
- **uploads**, **admin**: backend resource handlers
- **app**: routing and server startup
- **config**: environment configuration
- **error**: error types

## REST API Endpoints

- `POST /api/auth/register`, `POST /api/auth/login`, `GET /api/auth/profile`
- `POST /api/uploads`, `GET /api/uploads`, `POST /api/uploads/:id/analysis`
- `GET /api/admin/users`, `POST /api/admin/users/:id/promote`
*/

pub mod analytics;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod error;
pub mod history;
pub mod insights;
pub mod loader;
pub mod saving;

pub mod admin;
pub mod app;
pub mod client;
pub mod graph;
pub mod login;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod uploads;

pub use analytics::{Analytics, Counter};
pub use chart::{ChartKind, ChartSpec, build_chart};
pub use dataset::{CellValue, Record, RowDataset};
pub use error::{ApiError, ChartError, IngestError, StoreError};
pub use history::{AnalysisRecord, UploadHistoryEntry, UploadHistoryStore};
pub use insights::analyze;
pub use loader::CandidateFile;
pub use saving::{FileStorage, LocalStorage, MemoryStorage};

#[cfg(feature = "web")]
pub use error::{ClientError, RenderError};
#[cfg(feature = "web")]
pub use pipeline::Workspace;
#[cfg(feature = "web")]
pub use session::AuthSession;
