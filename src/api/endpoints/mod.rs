//! API endpoint handlers, one module per area of the clinic.

pub mod agenda;
pub mod ai;
pub mod anestesico;
pub mod atestados;
pub mod auth;
pub mod catalogo;
pub mod clinica;
pub mod cro;
pub mod documentos;
pub mod health;
pub mod pacientes;
pub mod receitas;
pub mod reports;
pub mod users;
