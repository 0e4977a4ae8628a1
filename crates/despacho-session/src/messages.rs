// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing texts (pt-BR) and menu renderers.
//!
//! Everything a driver reads lives here so flows stay free of literals and
//! the wording can be reviewed in one place.

use despacho_core::RouteRef;

pub const GREET_ASK_ID: &str =
    "Olá! Bem-vindo ao despacho de rotas. Informe seu ID de motorista para começar.";

pub const INVALID_ID: &str = "ID não encontrado. Confira o número e envie novamente.";

pub const MAIN_MENU: &str = "Escolha uma opção:\n\
1 - Pegar uma rota\n\
2 - Ajuda\n\n\
Envie encerrar para sair.";

pub const INVALID_OPTION: &str = "Opção inválida.";

pub const ALREADY_ASSIGNED: &str = "Você já possui uma rota atribuída. Boa entrega!";

pub const STILL_IN_QUEUE: &str =
    "Você já está na fila. Avisaremos quando chegar a sua vez. Envie encerrar para sair da fila.";

pub const NO_ROUTES: &str = "Não há rotas disponíveis no momento. Tente novamente mais tarde.";

pub const ROUTE_TAKEN: &str =
    "Essa rota acabou de ser atribuída a outro motorista. Veja as opções atualizadas:";

pub const SESSION_CLOSED: &str = "Atendimento encerrado. Até a próxima!";

pub const CLOSED_INACTIVITY: &str =
    "Atendimento encerrado por inatividade. Envie qualquer mensagem para recomeçar.";

pub const PLEASE_WAIT_SYNC: &str =
    "Estamos atualizando os dados. Aguarde alguns minutos e tente novamente.";

pub const ASK_SYNC_PASSWORD: &str = "Informe a senha de sincronização:";

pub const SYNC_WRONG_PASSWORD: &str = "Senha incorreta. Operação cancelada.";

pub const SYNC_STARTED: &str = "Sincronização iniciada. Avisarei quando terminar.";

pub const SYNC_DONE: &str = "Sincronização concluída.";

pub const SYNC_FAILED: &str = "A sincronização falhou. Verifique os registros do serviço.";

pub const LOG_EMPTY: &str = "Nenhum evento registrado hoje.";

pub fn greet_by_name(name: &str) -> String {
    format!("Olá, {name}!")
}

pub fn in_queue(position: usize) -> String {
    format!(
        "Você está na fila! Posição atual: {position}. Avisaremos quando chegar a sua vez.\n\
Envie encerrar para sair da fila."
    )
}

/// Numbered route menu in the order stored in the session.
pub fn routes_menu(routes: &[RouteRef]) -> String {
    let mut text = String::from("Rotas disponíveis:\n");
    for (i, route) in routes.iter().enumerate() {
        text.push_str(&format!("{} - {}", i + 1, route.label));
        if let Some(region) = &route.region {
            text.push_str(&format!(" ({region})"));
        }
        text.push('\n');
    }
    text.push_str("\nEnvie o número da rota desejada ou encerrar para sair.");
    text
}

pub fn claim_success(route: &RouteRef) -> String {
    format!(
        "Rota confirmada: {}. Boa entrega!\n\
Os detalhes completos estão na sua planilha de hoje.",
        route.label
    )
}
