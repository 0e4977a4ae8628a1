// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static help-menu content.
//!
//! The FAQ ships as a fixed snapshot; content management happens outside
//! the dispatcher and lands here on release.

pub struct FaqEntry {
    pub key: &'static str,
    pub question: &'static str,
    pub answer: &'static str,
}

pub const FAQ: &[FaqEntry] = &[
    FaqEntry {
        key: "1",
        question: "Horários de coleta",
        answer: "As coletas começam às 7h no galpão. Chegue com pelo menos 15 minutos \
de antecedência para a conferência dos pacotes.",
    },
    FaqEntry {
        key: "2",
        question: "Pagamento e repasses",
        answer: "Os repasses são processados toda sexta-feira. Dúvidas sobre valores, \
fale com o financeiro pelo número fixado no mural do galpão.",
    },
    FaqEntry {
        key: "3",
        question: "Problemas com a rota",
        answer: "Endereço errado ou pacote recusado? Registre a ocorrência no aplicativo \
de entregas e siga para a próxima parada. O suporte ajusta a rota ao longo do dia.",
    },
    FaqEntry {
        key: "4",
        question: "Veículo quebrou",
        answer: "Avise o plantão imediatamente para a carga ser remanejada. Depois envie \
encerrar aqui para liberar a fila.",
    },
];

pub fn find(key: &str) -> Option<&'static FaqEntry> {
    FAQ.iter().find(|entry| entry.key == key)
}

/// The help-menu screen.
pub fn render_menu() -> String {
    let mut text = String::from("Ajuda - escolha um assunto:\n");
    for entry in FAQ {
        text.push_str(&format!("{} - {}\n", entry.key, entry.question));
    }
    text.push_str("\nEnvie voltar para o menu principal ou encerrar para sair.");
    text
}
